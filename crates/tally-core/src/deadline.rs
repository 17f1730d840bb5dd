// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bounded store calls.

use std::future::Future;
use std::time::Duration;

use crate::error::TallyError;

/// Run a store call, turning an elapsed deadline into [`TallyError::StoreUnavailable`].
///
/// A timeout is just another store failure: each caller routes it through the
/// same policy it applies to a store error.
pub async fn with_deadline<T, F>(duration: Duration, call: F) -> Result<T, TallyError>
where
    F: Future<Output = Result<T, TallyError>>,
{
    match tokio::time::timeout(duration, call).await {
        Ok(result) => result,
        Err(_) => Err(TallyError::StoreUnavailable {
            source: format!("store call timed out after {duration:?}").into(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn elapsed_deadline_is_store_failure() {
        let result: Result<(), TallyError> = with_deadline(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            Ok(())
        })
        .await;
        let err = result.unwrap_err();
        assert!(err.is_store_failure());
        assert!(err.to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn completed_call_passes_through() {
        let value = with_deadline(Duration::from_secs(1), async { Ok::<_, TallyError>(7) })
            .await
            .unwrap();
        assert_eq!(value, 7);
    }
}
