use std::sync::Arc;

use tokio::sync::watch;

use crate::models::TokenPair;

/// In-memory mirror of the persisted token pair.
///
/// Cloned into the API client, which only reads it. Writers are the
/// session and the refresh coordinator, always right after persisting.
#[derive(Clone)]
pub struct TokenCell {
    tx: Arc<watch::Sender<Option<TokenPair>>>,
}

impl TokenCell {
    pub fn new(initial: Option<TokenPair>) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx: Arc::new(tx) }
    }

    pub fn get(&self) -> Option<TokenPair> {
        self.tx.borrow().clone()
    }

    pub fn access_token(&self) -> Option<String> {
        self.tx.borrow().as_ref().map(|t| t.access_token.clone())
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.tx.borrow().as_ref().map(|t| t.refresh_token.clone())
    }

    pub(crate) fn set(&self, tokens: TokenPair) {
        self.tx.send_replace(Some(tokens));
    }

    pub(crate) fn clear(&self) {
        self.tx.send_replace(None);
    }
}

impl Default for TokenCell {
    fn default() -> Self {
        Self::new(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_tokens() {
        let cell = TokenCell::default();
        let reader = cell.clone();
        assert!(reader.access_token().is_none());

        cell.set(TokenPair::new("t1", "r1"));
        assert_eq!(reader.access_token().as_deref(), Some("t1"));
        assert_eq!(reader.refresh_token().as_deref(), Some("r1"));

        cell.clear();
        assert!(reader.get().is_none());
    }
}
