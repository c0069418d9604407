/*
 * SPDX-FileCopyrightText: © 2023 Jinwoo Park (pmnxis@gmail.com)
 *
 * SPDX-License-Identifier: MIT OR Apache-2.0
 */

//! Card handling state machine.
//!
//! ```text
//!            master (n < enroll)                 master
//!   Idle ------------------------> Counting ---------------+
//!    | ^  <------ window expired ---|   | n == enroll      | n == remove
//!    | |                            |   v                  v
//!    | |                        slave  Enrolling --master--> Removing
//!    | |                            |   (add loop)          (remove loop)
//!    | +----------------------------|--------------------- master
//!    | slave                        v
//!    +----------------------> CheckingSlave
//!                              | known            | unknown
//!                              v                  v
//!                           DoorOpen           reject message -> Idle
//!                 Holding -> CountingDown -> relock -> Idle
//! ```
//!
//! One call of [`AccessController::poll`] is one turn of the main loop. Only short
//! fixed UI pauses block, the door cycle is sampled from the tick source so the loop
//! keeps running while the door is open.

use core::fmt::Write;

use heapless::String;

use crate::flash::{FaultKind, FlashDevice};
use crate::registry::CardRegistry;
use crate::types::*;

const IDLE_LINES: (&str, &str) = ("Welcome To Room", " Put Your Card");
const COUNTING_LINES: (&str, &str) = ("Master Verified", "Tap Again ...");
const ENROLL_LINES: (&str, &str) = ("Add Slave Card", "Waiting ...");
const REMOVE_LINES: (&str, &str) = ("Del Slave Card", "Waiting ...");

/// Source of presented cards
pub trait CardReader {
    /// Single non blocking query, `None` when nothing (or nothing readable) is in the field.
    fn try_read_card_id(&mut self) -> Option<CardId>;

    /// End the session of the card just read, so it is not reported again until re-presented.
    fn halt(&mut self);
}

/// 16x2 text display and door actuator
pub trait Presentation {
    fn show_lines(&mut self, line0: &str, line1: &str);

    fn clear(&mut self);

    fn set_door_actuator(&mut self, position: DoorPosition);
}

impl<T: CardReader + ?Sized> CardReader for &mut T {
    fn try_read_card_id(&mut self) -> Option<CardId> {
        (**self).try_read_card_id()
    }

    fn halt(&mut self) {
        (**self).halt()
    }
}

impl<T: Presentation + ?Sized> Presentation for &mut T {
    fn show_lines(&mut self, line0: &str, line1: &str) {
        (**self).show_lines(line0, line1)
    }

    fn clear(&mut self) {
        (**self).clear()
    }

    fn set_door_actuator(&mut self, position: DoorPosition) {
        (**self).set_door_actuator(position)
    }
}

pub trait TickSource {
    /// Free running millisecond counter
    fn now_ms(&self) -> u64;

    /// Blocking pause for fixed UI transitions
    fn delay_ms(&mut self, ms: u32);
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct ControllerConfig {
    /// Consecutive master presentations that enter enrollment
    pub enroll_threshold: u8,
    /// Master presentations since idle that enter removal. Presentations made
    /// after enrollment was entered count too, so with the defaults the third
    /// master card moves from enrolling to removing.
    pub remove_threshold: u8,
    /// Counting falls back to idle when no card shows up in this window
    pub master_window_ms: u32,
    pub mode_entry_pause_ms: u32,
    pub status_hold_ms: u32,
    pub reject_hold_ms: u32,
    pub door_hold_ms: u32,
    pub countdown_secs: u8,
    pub relock_settle_ms: u32,
}

impl ControllerConfig {
    pub const fn default() -> Self {
        Self {
            enroll_threshold: 2,
            remove_threshold: 3,
            master_window_ms: 5000,
            mode_entry_pause_ms: 200,
            status_hold_ms: 1000,
            reject_hold_ms: 2000,
            door_hold_ms: 2000,
            countdown_secs: 9,
            relock_settle_ms: 500,
        }
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self::default()
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DoorCycle {
    /// Door unlatched, nothing shown but the welcome text
    Holding { since: u64 },
    /// Closing countdown, `shown` is the second value currently on the display
    CountingDown { since: u64, shown: u8 },
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AccessMode {
    Idle,
    CountingMasterPresentations { since: u64 },
    Enrolling,
    Removing,
    CheckingSlave(CardId),
    DoorOpen(DoorCycle),
}

/// Everything the main loop carries between polls.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct AccessControllerState {
    mode: AccessMode,
    master_presentations: u8,
}

impl AccessControllerState {
    pub const fn new() -> Self {
        Self {
            mode: AccessMode::Idle,
            master_presentations: 0,
        }
    }

    pub fn mode(&self) -> AccessMode {
        self.mode
    }

    pub fn master_presentations(&self) -> u8 {
        self.master_presentations
    }

    fn enter(&mut self, mode: AccessMode) {
        if self.mode != mode {
            hybrid_debug!("access mode {:?} -> {:?}", self.mode, mode);
        }
        self.mode = mode;
    }
}

impl Default for AccessControllerState {
    fn default() -> Self {
        Self::new()
    }
}

pub struct AccessController<R, P, T>
where
    R: CardReader,
    P: Presentation,
    T: TickSource,
{
    reader: R,
    ui: P,
    ticks: T,
    config: ControllerConfig,
}

impl<R, P, T> AccessController<R, P, T>
where
    R: CardReader,
    P: Presentation,
    T: TickSource,
{
    pub fn new(reader: R, ui: P, ticks: T, config: ControllerConfig) -> Self {
        Self {
            reader,
            ui,
            ticks,
            config,
        }
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn reader(&self) -> &R {
        &self.reader
    }

    pub fn reader_mut(&mut self) -> &mut R {
        &mut self.reader
    }

    pub fn presentation(&self) -> &P {
        &self.ui
    }

    pub fn presentation_mut(&mut self) -> &mut P {
        &mut self.ui
    }

    pub fn ticks(&self) -> &T {
        &self.ticks
    }

    pub fn ticks_mut(&mut self) -> &mut T {
        &mut self.ticks
    }

    /// Draw the idle prompt, call once before the first poll.
    pub fn start(&mut self, state: &mut AccessControllerState) {
        self.return_to_idle(state);
    }

    pub fn poll<F: FlashDevice>(
        &mut self,
        state: &mut AccessControllerState,
        registry: &mut CardRegistry<F>,
    ) -> Result<(), FaultKind> {
        match state.mode {
            AccessMode::CheckingSlave(card) => {
                self.check_slave(state, registry, card);
                return Ok(());
            }
            AccessMode::DoorOpen(cycle) => {
                if let Some(card) = self.read_card() {
                    hybrid_debug!("door open, {} ignored", card);
                }
                self.run_door_cycle(state, cycle);
                return Ok(());
            }
            _ => {}
        }

        let class = registry.classify(self.read_card());

        match (state.mode, class) {
            (AccessMode::CountingMasterPresentations { since }, CardClass::NoCard) => {
                let elapsed = self.ticks.now_ms().saturating_sub(since);
                if elapsed >= self.config.master_window_ms as u64 {
                    hybrid_info!("master window expired");
                    self.return_to_idle(state);
                }
                Ok(())
            }
            (_, CardClass::NoCard) => Ok(()),
            (
                AccessMode::Idle | AccessMode::CountingMasterPresentations { .. },
                CardClass::Master,
            ) => {
                self.count_master(state);
                Ok(())
            }
            (
                AccessMode::Idle | AccessMode::CountingMasterPresentations { .. },
                CardClass::Slave(card),
            ) => {
                state.master_presentations = 0;
                state.enter(AccessMode::CheckingSlave(card));
                Ok(())
            }
            (AccessMode::Enrolling, CardClass::Master) => {
                self.count_master_while_enrolling(state);
                Ok(())
            }
            (AccessMode::Enrolling, CardClass::Slave(card)) => self.enroll(registry, card),
            (AccessMode::Removing, CardClass::Master) => {
                self.return_to_idle(state);
                Ok(())
            }
            (AccessMode::Removing, CardClass::Slave(card)) => self.withdraw(registry, card),
            (AccessMode::CheckingSlave(_) | AccessMode::DoorOpen(_), _) => Ok(()),
        }
    }

    fn read_card(&mut self) -> Option<CardId> {
        let card = self.reader.try_read_card_id()?;
        self.reader.halt();
        Some(card)
    }

    fn show(&mut self, lines: (&str, &str)) {
        self.ui.show_lines(lines.0, lines.1);
    }

    /// Status message that stays for a fixed time and is then wiped
    fn flash_message(&mut self, line0: &str, line1: &str, hold_ms: u32) {
        self.ui.clear();
        self.ui.show_lines(line0, line1);
        self.ticks.delay_ms(hold_ms);
        self.ui.clear();
    }

    fn return_to_idle(&mut self, state: &mut AccessControllerState) {
        state.master_presentations = 0;
        state.enter(AccessMode::Idle);
        self.show(IDLE_LINES);
    }

    fn count_master(&mut self, state: &mut AccessControllerState) {
        state.master_presentations = state.master_presentations.saturating_add(1);
        let count = state.master_presentations;
        hybrid_info!("master card presentation {}", count);

        if count == self.config.enroll_threshold {
            self.enter_enrolling(state);
        } else if count == self.config.remove_threshold {
            self.enter_removing(state);
        } else if count > self.config.enroll_threshold.max(self.config.remove_threshold) {
            self.return_to_idle(state);
        } else {
            state.enter(AccessMode::CountingMasterPresentations {
                since: self.ticks.now_ms(),
            });
            self.show(COUNTING_LINES);
        }
    }

    /// Presentations made while enrolling keep counting towards removal
    fn count_master_while_enrolling(&mut self, state: &mut AccessControllerState) {
        state.master_presentations = state.master_presentations.saturating_add(1);
        let count = state.master_presentations;
        hybrid_info!("master card presentation {} while enrolling", count);

        if count >= self.config.remove_threshold {
            self.enter_removing(state);
        } else {
            self.show(ENROLL_LINES);
        }
    }

    fn enter_enrolling(&mut self, state: &mut AccessControllerState) {
        self.ui.clear();
        self.ticks.delay_ms(self.config.mode_entry_pause_ms);
        state.enter(AccessMode::Enrolling);
        self.show(ENROLL_LINES);
    }

    fn enter_removing(&mut self, state: &mut AccessControllerState) {
        self.ui.clear();
        self.ticks.delay_ms(self.config.mode_entry_pause_ms);
        state.enter(AccessMode::Removing);
        self.show(REMOVE_LINES);
    }

    fn report_fault(&mut self, fault: FaultKind) {
        let mut line: String<20> = String::new();
        let _ = write!(line, "{}", fault);
        self.ui.clear();
        self.ui.show_lines("Flash Fault", &line);
    }

    fn enroll<F: FlashDevice>(
        &mut self,
        registry: &mut CardRegistry<F>,
        card: CardId,
    ) -> Result<(), FaultKind> {
        let outcome = registry.add(card).map_err(|e| {
            self.report_fault(e);
            e
        })?;

        let line1 = match outcome {
            AddOutcome::Added => "Success!!!",
            AddOutcome::AlreadyPresent => "Card Was Added",
            AddOutcome::TableFull => "Failure: Full",
        };
        hybrid_info!("enroll {} : {:?}", card, outcome);

        self.flash_message(ENROLL_LINES.0, line1, self.config.status_hold_ms);
        self.show(ENROLL_LINES);
        Ok(())
    }

    fn withdraw<F: FlashDevice>(
        &mut self,
        registry: &mut CardRegistry<F>,
        card: CardId,
    ) -> Result<(), FaultKind> {
        let outcome = registry.remove(card).map_err(|e| {
            self.report_fault(e);
            e
        })?;

        let line1 = match outcome {
            RemoveOutcome::Removed => "Success!!!",
            RemoveOutcome::NotFound => "Not Added Yet",
        };
        hybrid_info!("remove {} : {:?}", card, outcome);

        self.flash_message(REMOVE_LINES.0, line1, self.config.status_hold_ms);
        self.show(REMOVE_LINES);
        Ok(())
    }

    fn check_slave<F: FlashDevice>(
        &mut self,
        state: &mut AccessControllerState,
        registry: &CardRegistry<F>,
        card: CardId,
    ) {
        if registry.contains(&card) {
            hybrid_info!("{} granted", card);
            self.ui.clear();
            self.ui.show_lines("Welcome To Room", "Door Unlocked");
            self.ui.set_door_actuator(DoorPosition::Unlocked);
            state.enter(AccessMode::DoorOpen(DoorCycle::Holding {
                since: self.ticks.now_ms(),
            }));
        } else {
            hybrid_info!("{} rejected", card);
            self.flash_message("Sorry", "Card Not Found!", self.config.reject_hold_ms);
            self.return_to_idle(state);
        }
    }

    fn run_door_cycle(&mut self, state: &mut AccessControllerState, cycle: DoorCycle) {
        let now = self.ticks.now_ms();

        match cycle {
            DoorCycle::Holding { since } => {
                if now.saturating_sub(since) >= self.config.door_hold_ms as u64 {
                    self.ui.clear();
                    let secs = self.config.countdown_secs;
                    self.show_countdown(secs);
                    state.enter(AccessMode::DoorOpen(DoorCycle::CountingDown {
                        since: now,
                        shown: secs,
                    }));
                }
            }
            DoorCycle::CountingDown { since, shown } => {
                let elapsed_secs = now.saturating_sub(since) / 1000;

                if elapsed_secs >= self.config.countdown_secs as u64 {
                    self.relock(state);
                    return;
                }

                let remain = self.config.countdown_secs - elapsed_secs as u8;
                if remain != shown {
                    self.show_countdown(remain);
                    state.enter(AccessMode::DoorOpen(DoorCycle::CountingDown {
                        since,
                        shown: remain,
                    }));
                }
            }
        }
    }

    fn show_countdown(&mut self, remain: u8) {
        let mut line: String<20> = String::new();
        let _ = write!(line, "In {} Sec HurryUp", remain);
        self.ui.show_lines("Door Will Close", &line);
    }

    fn relock(&mut self, state: &mut AccessControllerState) {
        hybrid_info!("door relocked");
        self.ui.set_door_actuator(DoorPosition::Locked);
        self.ticks.delay_ms(self.config.relock_settle_ms);
        self.ui.clear();
        self.ui.set_door_actuator(DoorPosition::Released);
        self.return_to_idle(state);
    }
}
