//! 認証情報の秘匿値
//!
//! パスワードやトークンを不透明なハンドルとして保持します。
//! 平文を取り出せるのはクレート内部でレジストリ認証を行う呼び出しだけです。

use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// 平文を表示・シリアライズできない秘匿値
///
/// `Display` は実装しない。`Debug` は常に伏せ字を出力する。
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SecretHandle {
    inner: String,
}

impl SecretHandle {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            inner: value.into(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// 1回の認証呼び出しのためだけに平文を貸し出す
    pub(crate) fn expose(&self) -> &str {
        &self.inner
    }
}

impl From<String> for SecretHandle {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<&str> for SecretHandle {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl fmt::Debug for SecretHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretHandle([REDACTED])")
    }
}
