//! Job handlers shipped with the worker.
//!
//! | Job type       | Handler                 | Payload                                  |
//! |----------------|-------------------------|------------------------------------------|
//! | `email`        | [`EmailHandler`]        | `{to, subject, body, html}`              |
//! | `webhook`      | [`WebhookHandler`]      | `{url, method, headers, body}`           |
//! | `notification` | [`NotificationHandler`] | `{user_id, type, title, message, data}`  |
//! | `cleanup`      | [`CleanupHandler`]      | `{target, older_than, dry_run}`          |

mod cleanup;
mod email;
mod notification;
mod webhook;

pub use cleanup::{parse_duration, CleanupHandler, CleanupPayload, DurationError};
pub use email::{EmailHandler, EmailPayload};
pub use notification::{Channel, NotificationHandler, NotificationPayload};
pub use webhook::{WebhookHandler, WebhookPayload, REQUEST_TIMEOUT};

use crate::config::TaskflowConfig;
use taskflow::prelude::*;

/// Job type of [`EmailHandler`].
pub const EMAIL: &str = "email";
/// Job type of [`WebhookHandler`].
pub const WEBHOOK: &str = "webhook";
/// Job type of [`NotificationHandler`].
pub const NOTIFICATION: &str = "notification";
/// Job type of [`CleanupHandler`].
pub const CLEANUP: &str = "cleanup";

/// Register every built-in handler on `pool`, each wrapped in [`logging`].
///
/// # Errors
///
/// Returns an error if the SMTP relay or HTTP client cannot be set up.
pub fn register_all(pool: &WorkerPool, config: &TaskflowConfig) -> anyhow::Result<()> {
    let middleware = [logging()];

    pool.register_handler(
        EMAIL,
        chain(EmailHandler::from_settings(&config.smtp)?, &middleware),
    );
    pool.register_handler(WEBHOOK, chain(WebhookHandler::new()?, &middleware));
    pool.register_handler(
        NOTIFICATION,
        chain(
            NotificationHandler::new(config.notifications.clone()),
            &middleware,
        ),
    );
    pool.register_handler(CLEANUP, chain(CleanupHandler, &middleware));

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskflow::testing::memory_queue;

    #[test]
    fn test_register_all_covers_every_type() {
        let (queue, _store) = memory_queue();
        let pool = WorkerPool::new(queue, WorkerConfig::default());
        register_all(&pool, &TaskflowConfig::default()).unwrap();

        assert_eq!(
            pool.registry().job_types(),
            vec![CLEANUP, EMAIL, NOTIFICATION, WEBHOOK]
        );
    }
}
