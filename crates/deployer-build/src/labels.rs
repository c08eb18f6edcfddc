//! イメージラベルの組み立て
//!
//! `key=value` 形式の文字列を検証してラベルの集合にします。
//! 不正なエントリは診断を出して除外し、ビルド自体は止めません。

use std::collections::BTreeMap;

/// OCI の作成日時ラベル
pub const CREATED_LABEL: &str = "org.opencontainers.image.created";

/// イメージに付与するラベル（同じキーは後勝ち）
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelSet {
    labels: BTreeMap<String, String>,
}

impl LabelSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// 生のエントリからラベルを作る
    ///
    /// 最初の `=` でのみ分割するため、値に `=` を含めてもよい。
    /// 戻り値の2つ目は除外したエントリ。
    pub fn from_entries<S: AsRef<str>>(entries: &[S]) -> (Self, Vec<String>) {
        let mut set = Self::new();
        let rejected = set.extend_entries(entries);
        (set, rejected)
    }

    /// 既存のラベルにエントリを追加し、除外したエントリを返す
    pub fn extend_entries<S: AsRef<str>>(&mut self, entries: &[S]) -> Vec<String> {
        let mut rejected = Vec::new();

        for entry in entries {
            let entry = entry.as_ref();
            match entry.split_once('=') {
                Some((key, value)) if !key.is_empty() => {
                    self.insert(key, value);
                }
                _ => {
                    tracing::warn!(label = %entry, "Invalid label, expected key=value");
                    rejected.push(entry.to_string());
                }
            }
        }

        rejected
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.labels.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.labels.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.labels.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}
