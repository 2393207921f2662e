use std::sync::Arc;
use tracing::{debug, info};

use super::error::{RegistryError, Result};
use super::types::{TypeKey, same_identifier};
use crate::os::{self, AssignmentApi, HandlerDatabase, HandlerTarget, OsError, SystemServices};

/// Default Handler Mutator: writes a new default to the OS handler database.
///
/// The write is confirmed by querying the database again. Updating the
/// published snapshot is the caller's job and happens only on `Ok`.
#[derive(Clone)]
pub struct DefaultMutator {
    handlers: Arc<dyn HandlerDatabase>,
}

impl DefaultMutator {
    pub fn new(services: &SystemServices) -> Self {
        Self {
            handlers: services.handlers.clone(),
        }
    }

    pub async fn set_default(&self, identifier: &str, key: &TypeKey) -> Result<()> {
        let failure = |reason: String| RegistryError::AssignmentFailure {
            key: key.clone(),
            app: identifier.to_string(),
            reason,
        };

        let target = HandlerTarget::for_key(key)
            .ok_or_else(|| failure("type has no system registration".to_string()))?;

        match &target {
            HandlerTarget::UrlScheme(scheme) => {
                self.handlers
                    .assign_url_scheme(identifier, scheme)
                    .await
                    .map_err(|e| failure(e.to_string()))?;
                debug!(%key, app = %identifier, "Scheme handler assigned");
            }
            HandlerTarget::ContentType(content_type) => {
                let api = self
                    .assign_content_type(identifier, content_type)
                    .await
                    .map_err(|e| failure(e.to_string()))?;
                debug!(%key, app = %identifier, ?api, "Content type handler assigned");
            }
        }

        match self.handlers.default_handler(&target).await {
            Ok(Some(current)) if same_identifier(&current, identifier) => {
                info!(%key, app = %identifier, "Default handler changed");
                Ok(())
            }
            Ok(current) => Err(failure(format!(
                "handler database still reports {}",
                current.as_deref().unwrap_or("no default")
            ))),
            Err(e) => Err(failure(format!("could not verify the change: {e}"))),
        }
    }

    /// Modern per-content-type call where offered, role-handler call otherwise.
    async fn assign_content_type(&self, identifier: &str, content_type: &str) -> os::Result<AssignmentApi> {
        if self.handlers.supports_modern_assignment() {
            match self
                .handlers
                .assign_content_type(identifier, content_type, AssignmentApi::Modern)
                .await
            {
                Ok(()) => return Ok(AssignmentApi::Modern),
                Err(OsError::Unsupported(what)) => {
                    debug!(content_type, what, "Modern assignment unavailable, using role handler call");
                }
                Err(e) => return Err(e),
            }
        }

        self.handlers
            .assign_content_type(identifier, content_type, AssignmentApi::Legacy)
            .await?;
        Ok(AssignmentApi::Legacy)
    }

    /// There is no public facility to remove a default registration.
    pub fn clear_default(&self, key: &TypeKey) -> Result<()> {
        Err(RegistryError::Unsupported {
            operation: "clearing a default handler",
            key: key.clone(),
        })
    }
}
