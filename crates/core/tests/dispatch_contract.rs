// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use labwired_irq_core::board::build_board;
use labwired_irq_core::diagnostics::DiagnosticLog;
use labwired_irq_core::group::GroupSpec;
use labwired_irq_core::peripheral::{PinLevel, Speed};
use labwired_irq_core::{
    ConfigError, Edge, GroupId, GroupMap, HandlerError, InterruptScheduler, LineConfig,
    LineController, LineHandler, LineId, PinId, Port, Priority, PriorityGrouping, Pull, SimBoard,
    TriggerContext,
};
use labwired_irq_core::Peripheral;
use labwired_irq_config::BoardConfig;
use std::sync::{Arc, Mutex};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

fn line(n: u8) -> LineId {
    LineId::new(n).unwrap()
}

#[derive(Clone, Default)]
struct Journal(Arc<Mutex<Vec<(LineId, bool)>>>);

/// Records the line it ran for and whether the flag was still set.
struct Probe {
    journal: Journal,
    board: Arc<SimBoard>,
}

impl LineHandler for Probe {
    fn on_trigger(&mut self, cx: &mut TriggerContext<'_>) -> Result<(), HandlerError> {
        let still_pending = self.board.exti.pending() & (1 << cx.line().index()) != 0;
        self.journal.0.lock().unwrap().push((cx.line(), still_pending));
        Ok(())
    }
}

/// Two lines on one shared vector.
fn shared_vector_board() -> Arc<SimBoard> {
    let groups = GroupMap::new(vec![GroupSpec {
        id: GroupId(42),
        name: "G".to_string(),
        lines: [line(0), line(1)].into_iter().collect(),
    }])
    .unwrap();
    Arc::new(SimBoard::new(groups, PriorityGrouping::default()))
}

#[test]
fn test_shared_vector_scenario() {
    init_tracing();
    let board = shared_vector_board();
    let log = Arc::new(DiagnosticLog::new());
    let controller = LineController::new(board.clone()).with_diagnostics(log.clone());
    let journal = Journal::default();

    controller
        .register_line(
            LineConfig::new(line(0), Edge::Falling, Pull::Up, Priority::new(2, 0)),
            Probe {
                journal: journal.clone(),
                board: board.clone(),
            },
        )
        .unwrap();
    controller
        .register_line(
            LineConfig::new(line(1), Edge::Rising, Pull::None, Priority::new(1, 0)),
            Probe {
                journal: journal.clone(),
                board: board.clone(),
            },
        )
        .unwrap();
    controller.enable(line(0)).unwrap();
    controller.enable(line(1)).unwrap();

    // Line 0 idles high through its pull-up; pressing pulls it low.
    let pa0 = PinId::new(Port::A, 0).unwrap();
    let pa1 = PinId::new(Port::A, 1).unwrap();
    assert!(board.drive_pin(pa0, Some(PinLevel::Low)));
    assert!(board.drive_pin(pa1, Some(PinLevel::High)));

    let report = controller.dispatch(GroupId(42));
    assert_eq!(report.serviced, vec![line(0), line(1)]);
    assert_eq!(
        *journal.0.lock().unwrap(),
        vec![(line(0), false), (line(1), false)]
    );
    assert!(!controller.is_pending(line(0)));
    assert!(!controller.is_pending(line(1)));
    assert!(log.is_empty());

    // The shared vector runs at the most urgent member's priority.
    assert_eq!(
        board.nvic.priority(GroupId(42)),
        Priority::new(1, 0)
    );
}

#[test]
fn test_pending_register_write_matches_controller_ack() {
    let board = Arc::new(SimBoard::stm32());
    let controller = LineController::new(board.clone());
    for n in [10, 11] {
        controller
            .register_line(
                LineConfig::new(line(n), Edge::Both, Pull::None, Priority::new(5, 0)),
                |_l: LineId| -> Result<(), HandlerError> { Ok(()) },
            )
            .unwrap();
        controller.enable(line(n)).unwrap();
        board.assert_line(line(n));
    }

    // Firmware clearing PR directly is the same acknowledgement.
    board.exti.write(0x14, 1 << 10).unwrap();
    assert!(!controller.is_pending(line(10)));
    assert_eq!(board.exti.read(0x14).unwrap(), 1 << 11);

    let report = controller.dispatch(GroupId(40));
    assert_eq!(report.serviced, vec![line(11)]);
    assert_eq!(board.exti.read(0x14).unwrap(), 0);
}

#[test]
fn test_enable_unknown_line_leaves_registers_alone() {
    let board = Arc::new(SimBoard::stm32());
    let controller = LineController::new(board.clone());
    let before = board.snapshot();
    assert_eq!(
        controller.enable(line(7)),
        Err(ConfigError::NotRegistered(line(7)))
    );
    assert_eq!(board.snapshot(), before);
}

#[test]
fn test_board_round_trip_through_scheduler() {
    init_tracing();
    let yaml = r#"
name: "bench"
ack_order: after_handler
livelock_threshold: 8
outputs:
  - pin: "PB0"
    initial_high: true
lines:
  - id: 3
    port: "B"
    edge: "rising"
    priority: { preempt: 1 }
    action: flag
    toggle: "PB0"
  - id: 4
    edge: "rising"
    priority: { preempt: 1 }
    action: fail
"#;
    let config = BoardConfig::from_yaml_str(yaml).unwrap();
    let board = build_board(&config).unwrap();
    assert_eq!(board.controller.ack_order(), labwired_irq_core::AckOrder::AfterHandler);

    board.hardware.assert_line(line(3));
    board.hardware.assert_line(line(4));
    let summary = board.scheduler.service().unwrap();
    assert_eq!(summary.dispatches, 2);
    assert_eq!(board.log.len(), 1);

    let report = board.run_main_loop_once();
    assert_eq!(report.flags, vec![line(3)]);
    let led = PinId::new(Port::B, 0).unwrap();
    assert_eq!(report.toggled, vec![(led, PinLevel::Low)]);
    assert!(board.scheduler.is_idle());
}

#[test]
fn test_output_pin_is_driven_by_controller() {
    let board = Arc::new(SimBoard::stm32());
    let controller = Arc::new(LineController::new(board.clone()));
    let led = controller.output_pin(PinId::new(Port::D, 12).unwrap(), Speed::High, PinLevel::Low);
    led.set_high();
    assert_eq!(board.port(Port::D).output(12), PinLevel::High);
    assert_eq!(board.port(Port::D).input(12), PinLevel::High);

    let scheduler = InterruptScheduler::new(controller);
    assert_eq!(scheduler.service().unwrap().dispatches, 0);
}
