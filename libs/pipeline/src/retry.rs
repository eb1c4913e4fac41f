use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use serde::Deserialize;

// ═══════════════════════════════════════════════════════════════
//  RetryPolicy: exponential backoff с ограничением попыток
// ═══════════════════════════════════════════════════════════════

/// Политика повторов: задержка `initial * multiplier^(n-1)`, не больше `max`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RetryPolicy {
    /// Всего попыток, включая первую. 1 = без повторов.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
}

fn default_max_attempts() -> u32 {
    5
}
fn default_initial_backoff_ms() -> u64 {
    200
}
fn default_max_backoff_ms() -> u64 {
    5_000
}
fn default_multiplier() -> f64 {
    2.0
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            multiplier: default_multiplier(),
        }
    }
}

impl RetryPolicy {
    /// Одна попытка, без повторов.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Задержка после `failures`-го неудачного вызова (нумерация с 1).
    pub fn delay_for(&self, failures: u32) -> Duration {
        let exp = failures.saturating_sub(1).min(32) as i32;
        let ms = (self.initial_backoff_ms as f64) * self.multiplier.max(1.0).powi(exp);
        let capped = ms.min(self.max_backoff_ms as f64);
        Duration::from_millis(capped as u64)
    }

    /// Есть ли ещё попытка после `attempt` (нумерация с 1).
    pub fn allows_another(&self, attempt: u32) -> bool {
        attempt < self.max_attempts.max(1)
    }
}

/// Терминальная ошибка повторяемой операции.
#[derive(Debug, thiserror::Error)]
pub enum RetryError<E> {
    /// Все попытки исчерпаны, ошибка оставалась транзиентной.
    #[error("{operation}: gave up after {attempts} attempts: {last}")]
    Exhausted { operation: String, attempts: u32, last: E },

    /// Ошибка не подлежит повтору.
    #[error("{operation}: {last}")]
    Permanent { operation: String, last: E },
}

impl<E> RetryError<E> {
    pub fn into_last(self) -> E {
        match self {
            RetryError::Exhausted { last, .. } | RetryError::Permanent { last, .. } => last,
        }
    }

    pub fn last(&self) -> &E {
        match self {
            RetryError::Exhausted { last, .. } | RetryError::Permanent { last, .. } => last,
        }
    }
}

/// Выполнить `op` с повторами по `policy`, пока `is_retryable` разрешает.
pub async fn retry_with_backoff<T, E, F, Fut>(
    policy: &RetryPolicy,
    operation: &str,
    is_retryable: impl Fn(&E) -> bool,
    mut op: F,
) -> Result<T, RetryError<E>>
where
    E: Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::info!(operation, attempt, "succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) if !is_retryable(&e) => {
                return Err(RetryError::Permanent {
                    operation: operation.to_string(),
                    last: e,
                });
            }
            Err(e) if !policy.allows_another(attempt) => {
                tracing::error!(operation, attempts = attempt, error = %e, "retries exhausted");
                return Err(RetryError::Exhausted {
                    operation: operation.to_string(),
                    attempts: attempt,
                    last: e,
                });
            }
            Err(e) => {
                let delay = policy.delay_for(attempt);
                tracing::warn!(
                    operation,
                    attempt,
                    max_attempts = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "attempt failed, backing off"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
