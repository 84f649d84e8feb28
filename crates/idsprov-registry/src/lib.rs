//! Container image publishing for IDS app offers.
//!
//! An offered app resource is backed by a container image stored in a
//! registry under the resource's id. This crate computes that image
//! reference, drives a container engine through pull, tag, login and push,
//! and simulates the registry's push notification to the connector.

pub mod engine;
pub mod error;
pub mod publish;
pub mod reference;
pub mod webhook;

pub use engine::{ContainerEngine, DockerCli};
pub use error::{RegistryError, Result};
pub use publish::{publish_image, ImagePublisher, ImageSettings, PublishReport, PublishState};
pub use reference::{ImageReference, RegistrySettings};
pub use webhook::{send_event, EventType, RegistryEvent};
