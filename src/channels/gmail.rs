//! OAuth mail delivery channel (not implemented)
//!
//! The contract exists so the `gmail_api` method can be selected and
//! validated like any other channel, but the OAuth token flow was never
//! built. Sending fails explicitly instead of attempting partial OAuth
//! logic; shows configured with this method get a failed outcome row naming
//! the gap, and no network call is made.

use crate::channels::{DeliveryReceipt, Sender};
use crate::error::{NotifierError, Result};
use crate::models::Recipient;

/// Always-failing OAuth mail stub
#[derive(Debug, Clone)]
pub struct GmailApiChannel {
    #[allow(dead_code)]
    sender: Sender,
}

impl GmailApiChannel {
    pub fn new(sender: Sender) -> Self {
        Self { sender }
    }

    pub async fn send(
        &self,
        _recipients: &[Recipient],
        _subject: &str,
        _html: &str,
    ) -> Result<DeliveryReceipt> {
        Err(NotifierError::not_implemented("gmail_api"))
    }
}
