//! circuit_breaker.rs
//!
//! Автоматический выключатель для исходящих HTTP-вызовов саги: к сервису авторизации
//! и к удаленному реестру мест. После `failure_threshold` сбоев подряд запросы
//! блокируются на `timeout`, затем пропускается ровно один пробный запрос. Остальные
//! запросы ждут его исхода; если исход не зарегистрирован за `timeout`, пропускается
//! следующий пробный запрос.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Состояния "Автоматического выключателя" (Circuit Breaker).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// **Closed (Замкнуто)**: Нормальный режим работы. Запросы к сервису разрешены.
    Closed,
    /// **Open (Разомкнуто)**: Запросы временно запрещены после серии сбоев.
    Open,
    /// **HalfOpen (Полуоткрыто)**: Пробный запрос уже в полете, остальные блокируются.
    HalfOpen,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    /// Имя защищаемого сервиса, для логов.
    name: &'static str,
    state: RwLock<CircuitState>,
    /// Счетчик последовательных сбоев.
    failure_count: AtomicU32,
    /// Момент последнего сбоя для расчета таймаута.
    last_failure: Mutex<Option<Instant>>,
    /// Момент выдачи пробного запроса в HalfOpen.
    trial_started: Mutex<Option<Instant>>,
    failure_threshold: u32,
    timeout_duration: Duration,
}

impl CircuitBreaker {
    pub fn new(name: &'static str, failure_threshold: u32, timeout_seconds: u64) -> Self {
        Self::with_timeout(name, failure_threshold, Duration::from_secs(timeout_seconds))
    }

    pub fn with_timeout(name: &'static str, failure_threshold: u32, timeout: Duration) -> Self {
        Self {
            name,
            state: RwLock::new(CircuitState::Closed),
            failure_count: AtomicU32::new(0),
            last_failure: Mutex::new(None),
            trial_started: Mutex::new(None),
            failure_threshold: failure_threshold.max(1),
            timeout_duration: timeout,
        }
    }

    // Паника другого потока не должна навсегда выключить сервис
    fn read_state(&self) -> RwLockReadGuard<'_, CircuitState> {
        self.state.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, CircuitState> {
        self.state.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn trial_slot(&self) -> std::sync::MutexGuard<'_, Option<Instant>> {
        self.trial_started.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Проверяет, можно ли выполнить следующий запрос к сервису.
    pub fn can_execute(&self) -> bool {
        let state = *self.read_state();

        match state {
            CircuitState::Closed => true,
            CircuitState::HalfOpen => {
                let mut trial = self.trial_slot();
                // Пробный запрос потерян (отмена, паника): выдаем новый после таймаута
                let stale = trial
                    .map(|at| at.elapsed() >= self.timeout_duration)
                    .unwrap_or(true);
                if stale {
                    *trial = Some(Instant::now());
                }
                stale
            }
            CircuitState::Open => {
                let last_failure = *self
                    .last_failure
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner());
                let expired = last_failure
                    .map(|at| at.elapsed() >= self.timeout_duration)
                    .unwrap_or(true);

                if !expired {
                    return false;
                }

                let mut state = self.write_state();
                match *state {
                    CircuitState::Open => {
                        *state = CircuitState::HalfOpen;
                        *self.trial_slot() = Some(Instant::now());
                        info!(service = self.name, "Circuit breaker transitioning to HalfOpen state");
                        true
                    }
                    CircuitState::Closed => true,
                    // Другой поток уже выдал пробный запрос
                    CircuitState::HalfOpen => false,
                }
            }
        }
    }

    /// Регистрирует успешное выполнение запроса.
    pub fn record_success(&self) {
        let mut state = self.write_state();
        if *state == CircuitState::HalfOpen {
            info!(service = self.name, "Circuit breaker recovered - transitioning to Closed state");
        }
        *state = CircuitState::Closed;
        *self.trial_slot() = None;
        self.failure_count.store(0, Ordering::Relaxed);
    }

    /// Регистрирует неудачное выполнение запроса.
    pub fn record_failure(&self) {
        let failure_count = self.failure_count.fetch_add(1, Ordering::Relaxed) + 1;
        *self
            .last_failure
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(Instant::now());

        let mut state = self.write_state();
        match *state {
            CircuitState::Closed if failure_count >= self.failure_threshold => {
                *state = CircuitState::Open;
                error!(
                    service = self.name,
                    "Circuit breaker OPENED - {} failures reached threshold {}",
                    failure_count, self.failure_threshold
                );
            }
            CircuitState::HalfOpen => {
                *state = CircuitState::Open;
                *self.trial_slot() = None;
                warn!(service = self.name, "Circuit breaker test failed - returning to Open state");
            }
            _ => {}
        }
    }

    pub fn get_state(&self) -> CircuitState {
        *self.read_state()
    }

    pub fn failure_count(&self) -> u32 {
        self.failure_count.load(Ordering::Relaxed)
    }
}
