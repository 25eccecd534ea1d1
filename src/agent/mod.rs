pub mod completion;
pub mod empathy;
pub mod prompt;

use async_trait::async_trait;

use crate::types::ChatMessage;

pub use completion::{CompletionClient, CompletionError, CompletionSettings};
pub use empathy::EmpathyFilter;

/// Produces the assistant's next line.
///
/// Implementations never fail: any error is turned into a short spoken
/// apology, because whatever comes back is read aloud to the user.
#[async_trait]
pub trait Completer: Send + Sync {
    async fn complete(
        &self,
        prior: &[ChatMessage],
        user_message: &str,
        system_prompt: &str,
    ) -> String;
}
