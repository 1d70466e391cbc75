//! System state machine (C9): Standby / Transfer / Utility.
//!
//! Grounded on `state_manager.py::StateManager` for the transition graph
//! and for accumulating `total_transfer_time` across multiple transfers
//! within one process.

use std::time::{Duration, Instant};

use crate::error::TransferError;
use crate::model::SystemState;

pub struct StateManager {
    state: SystemState,
    transfer_started_at: Option<Instant>,
    total_transfer_time: Duration,
}

impl Default for StateManager {
    fn default() -> Self {
        StateManager {
            state: SystemState::Standby,
            transfer_started_at: None,
            total_transfer_time: Duration::ZERO,
        }
    }
}

impl StateManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current_state(&self) -> SystemState {
        self.state
    }

    fn invalid(&self, target: SystemState) -> TransferError {
        TransferError::InvalidTransition {
            current: self.state,
            target,
        }
    }

    pub fn enter_transfer(&mut self) -> Result<(), TransferError> {
        if self.state != SystemState::Standby {
            return Err(self.invalid(SystemState::Transfer));
        }
        self.state = SystemState::Transfer;
        self.transfer_started_at = Some(Instant::now());
        Ok(())
    }

    pub fn exit_transfer(&mut self) -> Result<(), TransferError> {
        if self.state != SystemState::Transfer {
            return Err(self.invalid(SystemState::Standby));
        }
        if let Some(started) = self.transfer_started_at.take() {
            self.total_transfer_time += started.elapsed();
        }
        self.state = SystemState::Standby;
        Ok(())
    }

    pub fn enter_utility(&mut self) -> Result<(), TransferError> {
        if self.state != SystemState::Standby {
            return Err(self.invalid(SystemState::Utility));
        }
        self.state = SystemState::Utility;
        Ok(())
    }

    pub fn exit_utility(&mut self) -> Result<(), TransferError> {
        if self.state != SystemState::Utility {
            return Err(self.invalid(SystemState::Standby));
        }
        self.state = SystemState::Standby;
        Ok(())
    }

    /// Idempotent: returns to Standby from any state, accumulating transfer
    /// time if a transfer was in progress.
    pub fn enter_standby(&mut self) {
        if self.state == SystemState::Transfer {
            if let Some(started) = self.transfer_started_at.take() {
                self.total_transfer_time += started.elapsed();
            }
        }
        self.state = SystemState::Standby;
    }

    pub fn get_current_transfer_time(&self) -> Duration {
        self.transfer_started_at
            .map(|t| t.elapsed())
            .unwrap_or(Duration::ZERO)
    }

    pub fn get_total_transfer_time(&self) -> Duration {
        self.total_transfer_time + self.get_current_transfer_time()
    }

    pub fn format_time(duration: Duration) -> String {
        let total = duration.as_secs();
        let hours = total / 3600;
        let minutes = (total % 3600) / 60;
        let seconds = total % 60;
        format!("{hours}:{minutes:02}:{seconds:02}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standby_to_transfer_to_standby_accumulates_time() {
        let mut sm = StateManager::new();
        sm.enter_transfer().unwrap();
        assert_eq!(sm.current_state(), SystemState::Transfer);
        sm.exit_transfer().unwrap();
        assert_eq!(sm.current_state(), SystemState::Standby);
        assert!(sm.get_total_transfer_time() >= Duration::ZERO);
    }

    #[test]
    fn cannot_enter_transfer_from_utility() {
        let mut sm = StateManager::new();
        sm.enter_utility().unwrap();
        let err = sm.enter_transfer().unwrap_err();
        assert!(matches!(err, TransferError::InvalidTransition { .. }));
    }

    #[test]
    fn cannot_exit_transfer_when_not_transferring() {
        let mut sm = StateManager::new();
        let err = sm.exit_transfer().unwrap_err();
        assert!(matches!(err, TransferError::InvalidTransition { .. }));
    }

    #[test]
    fn enter_standby_is_idempotent_from_any_state() {
        let mut sm = StateManager::new();
        sm.enter_standby();
        assert_eq!(sm.current_state(), SystemState::Standby);
        sm.enter_utility().unwrap();
        sm.enter_standby();
        assert_eq!(sm.current_state(), SystemState::Standby);
    }
}
