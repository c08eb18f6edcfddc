//! deployer image build and publish functionality
//!
//! This crate drives a container engine to build an image, export it to a
//! local artifact and publish it to one or more registry tags. Credentials
//! are resolved once per registry host, per-tag failures are isolated and
//! collected into a single report, and the outcome maps onto sysexits(3).

pub mod auth;
pub mod cancel;
pub mod context;
pub mod docker;
pub mod engine;
pub mod error;
pub mod exit;
pub mod labels;
pub mod progress;
pub mod pusher;
pub mod reference;
pub mod report;
pub mod secret;
pub mod tags;

pub use auth::{
    CredentialCache, CredentialProvider, CredentialResolver, Credentials, RegistryAuth,
};
pub use cancel::{CancelHandle, CancelSignal, cancel_pair};
pub use context::ContextBuilder;
pub use docker::DockerEngine;
pub use engine::{BuildRequest, ContainerEngine, ImageHandle, export_artifact};
pub use error::{BuildError, BuildResult};
pub use exit::ExitStatus;
pub use labels::{CREATED_LABEL, LabelSet};
pub use progress::BuildProgress;
pub use pusher::ImagePusher;
pub use reference::ImageReference;
pub use report::{FailedPublish, PublishFailures, PublishReport, PublishedImage};
pub use secret::SecretHandle;
pub use tags::{ImageSpec, TargetReference, build_targets, split_image_tag, validate_tag};
