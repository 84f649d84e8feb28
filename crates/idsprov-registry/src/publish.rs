//! Image publishing workflow.
//!
//! Pulls a source image, tags it with the qualified reference of an offered
//! resource and pushes it to the registry. The stages run strictly in order
//! (pulled → tagged → pushed) and a failure aborts the remaining stages;
//! nothing is rolled back, so a failed push leaves the tagged image in place.

use serde::{Deserialize, Serialize};

use crate::engine::ContainerEngine;
use crate::error::{RegistryError, Result};
use crate::reference::{require, ImageReference, RegistrySettings};

/// Source image to publish.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSettings {
    /// Image to pull, e.g. `tutum/hello-world:latest`.
    #[serde(default)]
    pub name: Option<String>,
    /// Tag version for the pushed reference; omitted means no tag suffix.
    #[serde(default)]
    pub version: Option<String>,
}

/// The last stage an image reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PublishState {
    Pulled,
    Tagged,
    Pushed,
}

/// Outcome of a successful publish.
#[derive(Debug, Clone)]
pub struct PublishReport {
    pub reference: ImageReference,
    pub state: PublishState,
    /// Manifest digest reported by the push, if any.
    pub digest: Option<String>,
    /// Local images listed after tagging.
    pub images: Vec<String>,
}

/// Drives one image through the publishing stages.
pub struct ImagePublisher<'a> {
    engine: &'a dyn ContainerEngine,
    source: String,
    reference: ImageReference,
    username: String,
    password: String,
    state: Option<PublishState>,
    logged_in: bool,
}

impl<'a> ImagePublisher<'a> {
    /// Check every required setting before touching the engine.
    pub fn new(
        engine: &'a dyn ContainerEngine,
        registry: &RegistrySettings,
        image: &ImageSettings,
        resource_id: &str,
    ) -> Result<Self> {
        let source = require(image.name.as_deref(), "image.name")?.to_string();
        let reference =
            ImageReference::for_resource(registry, resource_id, image.version.as_deref())?;
        let (username, password) = registry.require_credentials()?;

        Ok(ImagePublisher {
            engine,
            source,
            reference,
            username: username.to_string(),
            password: password.to_string(),
            state: None,
            logged_in: false,
        })
    }

    pub fn reference(&self) -> &ImageReference {
        &self.reference
    }

    pub fn state(&self) -> Option<PublishState> {
        self.state
    }

    pub fn pull(&mut self) -> Result<()> {
        self.engine.pull(&self.source)?;
        tracing::info!(image = %self.source, "pulled image");
        self.state = Some(PublishState::Pulled);
        Ok(())
    }

    pub fn tag(&mut self) -> Result<()> {
        let target = self.reference.to_string();
        self.engine.tag(&self.source, &target)?;
        tracing::info!(image = %self.source, tag = %target, "tagged image");
        self.state = Some(PublishState::Tagged);
        Ok(())
    }

    pub fn login(&mut self) -> Result<()> {
        let registry = self.reference.registry();
        self.engine.login(registry, &self.username, &self.password)?;
        tracing::info!(registry, "logged in to registry");
        self.logged_in = true;
        Ok(())
    }

    /// Push the tagged reference. Requires a prior successful [`login`](Self::login).
    pub fn push(&mut self) -> Result<Option<String>> {
        if !self.logged_in {
            return Err(RegistryError::LoginRequired {
                registry: self.reference.registry().to_string(),
            });
        }
        let target = self.reference.to_string();
        let digest = self.engine.push(&target)?;
        tracing::info!(
            image = %target,
            digest = digest.as_deref().unwrap_or("unknown"),
            "pushed image"
        );
        self.state = Some(PublishState::Pushed);
        Ok(digest)
    }

    /// Run pull, tag, list, login and push in that order.
    pub fn run(mut self) -> Result<PublishReport> {
        self.pull()?;
        self.tag()?;
        let images = self.engine.list_images()?;
        tracing::debug!(count = images.len(), "local images: {}", images.join(", "));
        self.login()?;
        let digest = self.push()?;

        Ok(PublishReport {
            reference: self.reference,
            state: PublishState::Pushed,
            digest,
            images,
        })
    }
}

/// Publish `image` as the container of the resource with id `resource_id`.
pub fn publish_image(
    engine: &dyn ContainerEngine,
    registry: &RegistrySettings,
    image: &ImageSettings,
    resource_id: &str,
) -> Result<PublishReport> {
    let publisher = ImagePublisher::new(engine, registry, image, resource_id)?;
    tracing::info!(reference = %publisher.reference(), "publishing image");
    publisher.run()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    /// Records engine calls; fails the first call named `fail_on`.
    #[derive(Default)]
    struct RecordingEngine {
        calls: RefCell<Vec<String>>,
        fail_on: Option<&'static str>,
    }

    impl RecordingEngine {
        fn failing(command: &'static str) -> Self {
            RecordingEngine {
                fail_on: Some(command),
                ..RecordingEngine::default()
            }
        }

        fn record(&self, command: &str, detail: String) -> Result<()> {
            self.calls.borrow_mut().push(format!("{command} {detail}"));
            if self.fail_on == Some(command) {
                return Err(RegistryError::Engine {
                    command: command.to_string(),
                    detail: "denied".to_string(),
                });
            }
            Ok(())
        }

        fn commands(&self) -> Vec<String> {
            self.calls
                .borrow()
                .iter()
                .map(|c| c.split(' ').next().unwrap_or_default().to_string())
                .collect()
        }
    }

    impl ContainerEngine for RecordingEngine {
        fn login(&self, registry: &str, username: &str, _password: &str) -> Result<()> {
            self.record("login", format!("{registry} {username}"))
        }

        fn pull(&self, image: &str) -> Result<()> {
            self.record("pull", image.to_string())
        }

        fn tag(&self, source: &str, target: &str) -> Result<()> {
            self.record("tag", format!("{source} {target}"))
        }

        fn push(&self, reference: &str) -> Result<Option<String>> {
            self.record("push", reference.to_string())?;
            Ok(Some("sha256:abc".to_string()))
        }

        fn list_images(&self) -> Result<Vec<String>> {
            self.record("images", String::new())?;
            Ok(vec!["tutum/hello-world:latest".to_string()])
        }
    }

    fn registry() -> RegistrySettings {
        RegistrySettings {
            address: Some("registry.example.org".into()),
            repository: Some("ids-apps".into()),
            username: Some("robot".into()),
            password: Some("secret".into()),
        }
    }

    fn image() -> ImageSettings {
        ImageSettings {
            name: Some("tutum/hello-world:latest".into()),
            version: Some("latest".into()),
        }
    }

    #[test]
    fn stages_run_in_order() {
        let engine = RecordingEngine::default();
        let report = publish_image(&engine, &registry(), &image(), "res-1").unwrap();

        assert_eq!(
            engine.commands(),
            vec!["pull", "tag", "images", "login", "push"]
        );
        assert_eq!(report.state, PublishState::Pushed);
        assert_eq!(report.digest.as_deref(), Some("sha256:abc"));
        assert_eq!(
            report.reference.to_string(),
            "registry.example.org/ids-apps/res-1:latest"
        );
        assert_eq!(
            engine.calls.borrow()[1],
            "tag tutum/hello-world:latest registry.example.org/ids-apps/res-1:latest"
        );
    }

    #[test]
    fn login_exactly_once_before_push() {
        let engine = RecordingEngine::default();
        publish_image(&engine, &registry(), &image(), "res-1").unwrap();
        let commands = engine.commands();
        let logins: Vec<usize> = commands
            .iter()
            .enumerate()
            .filter(|(_, c)| *c == "login")
            .map(|(i, _)| i)
            .collect();
        let push = commands.iter().position(|c| c == "push").unwrap();
        assert_eq!(logins.len(), 1);
        assert!(logins[0] < push);
    }

    #[test]
    fn failed_login_prevents_push() {
        let engine = RecordingEngine::failing("login");
        let err = publish_image(&engine, &registry(), &image(), "res-1").unwrap_err();
        assert!(matches!(err, RegistryError::Engine { ref command, .. } if command == "login"));
        assert!(!engine.commands().contains(&"push".to_string()));
    }

    #[test]
    fn failed_pull_aborts_remaining_stages() {
        let engine = RecordingEngine::failing("pull");
        assert!(publish_image(&engine, &registry(), &image(), "res-1").is_err());
        assert_eq!(engine.commands(), vec!["pull"]);
    }

    #[test]
    fn missing_configuration_fails_before_engine_calls() {
        let engine = RecordingEngine::default();
        let mut settings = registry();
        settings.password = None;
        let err = publish_image(&engine, &settings, &image(), "res-1").unwrap_err();
        assert!(matches!(err, RegistryError::Configuration { ref field } if field == "registry.password"));

        let err = publish_image(&engine, &registry(), &ImageSettings::default(), "res-1").unwrap_err();
        assert!(err.to_string().contains("image.name"));

        let err = publish_image(&engine, &registry(), &image(), "").unwrap_err();
        assert!(err.to_string().contains("resource id"));
        assert!(engine.commands().is_empty());
    }

    #[test]
    fn push_without_login_is_rejected() {
        let engine = RecordingEngine::default();
        let mut publisher = ImagePublisher::new(&engine, &registry(), &image(), "res-1").unwrap();
        publisher.pull().unwrap();
        publisher.tag().unwrap();
        let err = publisher.push().unwrap_err();
        assert!(matches!(err, RegistryError::LoginRequired { .. }));
        assert_eq!(publisher.state(), Some(PublishState::Tagged));
        assert!(!engine.commands().contains(&"push".to_string()));
    }

    #[test]
    fn version_is_optional() {
        let engine = RecordingEngine::default();
        let image = ImageSettings {
            version: None,
            ..image()
        };
        let report = publish_image(&engine, &registry(), &image, "res-1").unwrap();
        assert_eq!(
            report.reference.to_string(),
            "registry.example.org/ids-apps/res-1"
        );
    }
}
