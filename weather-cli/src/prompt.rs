use async_trait::async_trait;
use inquire::Confirm;
use weather_core::{PermissionGate, PermissionStatus};

/// Asks on the terminal whether location may be used.
#[derive(Debug, Clone, Copy, Default)]
pub struct PromptPermission;

#[async_trait]
impl PermissionGate for PromptPermission {
    async fn ensure_location_permission(&self) -> PermissionStatus {
        let answer = tokio::task::spawn_blocking(|| {
            Confirm::new("Allow weather to look up your approximate location?")
                .with_default(true)
                .prompt()
        })
        .await;

        match answer {
            Ok(Ok(true)) => PermissionStatus::Granted,
            Ok(Ok(false)) => PermissionStatus::Denied,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "permission prompt failed; treating as denied");
                PermissionStatus::Denied
            }
            Err(e) => {
                tracing::warn!(error = %e, "permission prompt task failed");
                PermissionStatus::Denied
            }
        }
    }
}
