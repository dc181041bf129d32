//! Battle events and round observers.
//!
//! Everything that happens in a battle is recorded as a [`BattleEvent`].
//! Observers receive each event after the step that produced it; they can
//! watch but never influence the simulation.

use serde::{Deserialize, Serialize};

use crate::action::ActionKind;
use crate::battle::{Outcome, Phase};
use crate::cell::Cell;
use crate::hazards::{HazardId, HazardKind};
use crate::scheduler::ActionId;
use crate::status::StatusKind;
use crate::units::UnitId;

/// Something that happened during a battle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BattleEvent {
    /// `start()` completed wiring checks.
    BattleStarted,
    /// A new round began.
    RoundStarted {
        /// Round number, from 1.
        round: u32,
    },
    /// A round finished.
    RoundEnded {
        /// Round number.
        round: u32,
    },
    /// A phase began.
    PhaseStarted {
        /// Phase entered.
        phase: Phase,
        /// Current round.
        round: u32,
    },
    /// A phase finished.
    PhaseEnded {
        /// Phase left.
        phase: Phase,
        /// Current round.
        round: u32,
    },
    /// A behavior staged an action.
    ActionSubmitted {
        /// Owner.
        unit: UnitId,
        /// Action id.
        action: ActionId,
        /// Action tag.
        kind: ActionKind,
        /// Cells the action will affect.
        targets: Vec<Cell>,
    },
    /// A pending action was withdrawn.
    ActionCancelled {
        /// Owner.
        unit: UnitId,
        /// Action id.
        action: ActionId,
    },
    /// An action began executing.
    ActionStarted {
        /// Owner.
        unit: UnitId,
        /// Action id.
        action: ActionId,
        /// Action tag.
        kind: ActionKind,
    },
    /// An action finished.
    ActionCompleted {
        /// Owner.
        unit: UnitId,
        /// Action id.
        action: ActionId,
        /// Steps it took.
        steps: u32,
    },
    /// A unit lost effective health.
    UnitDamaged {
        /// Unit hit.
        unit: UnitId,
        /// Effective health lost.
        amount: u32,
        /// Health left.
        remaining: u32,
    },
    /// Damage aimed at one unit was taken by its protector.
    DamageRedirected {
        /// Intended target.
        from: UnitId,
        /// Protector.
        to: UnitId,
    },
    /// A unit died and left the map.
    UnitDied {
        /// The dead unit.
        unit: UnitId,
        /// Cell it died on.
        cell: Cell,
    },
    /// A unit's registered cell changed.
    UnitMoved {
        /// Unit moved.
        unit: UnitId,
        /// Previous cell.
        from: Cell,
        /// New cell.
        to: Cell,
    },
    /// A unit joined the battle.
    UnitSpawned {
        /// New unit.
        unit: UnitId,
        /// Template it came from.
        template: String,
        /// Cell it occupies.
        cell: Cell,
    },
    /// A hazard was placed.
    HazardCreated {
        /// New hazard.
        hazard: HazardId,
        /// Type.
        kind: HazardKind,
        /// Cell.
        cell: Cell,
    },
    /// A hazard ran out.
    HazardExpired {
        /// Hazard removed.
        hazard: HazardId,
        /// Cell it covered.
        cell: Cell,
    },
    /// A status effect was attached (or, for instant effects, applied).
    StatusApplied {
        /// Host.
        unit: UnitId,
        /// Effect tag.
        kind: StatusKind,
    },
    /// A status effect was removed.
    StatusExpired {
        /// Host.
        unit: UnitId,
        /// Effect tag.
        kind: StatusKind,
    },
    /// The battle reached a final outcome.
    BattleEnded {
        /// Victory or defeat.
        outcome: Outcome,
    },
}

/// Receives battle events.
///
/// Notifications are fire-and-forget. A panicking observer is logged and
/// skipped; the battle carries on.
pub trait RoundObserver {
    /// Called once per event, in order.
    fn notify(&mut self, event: &BattleEvent);
}

impl<T: RoundObserver + ?Sized> RoundObserver for std::rc::Rc<std::cell::RefCell<T>> {
    fn notify(&mut self, event: &BattleEvent) {
        self.borrow_mut().notify(event);
    }
}

/// Observer that keeps every event it sees.
#[derive(Debug, Clone, Default)]
pub struct EventRecorder {
    /// Events in arrival order.
    pub events: Vec<BattleEvent>,
}

impl RoundObserver for EventRecorder {
    fn notify(&mut self, event: &BattleEvent) {
        self.events.push(event.clone());
    }
}
