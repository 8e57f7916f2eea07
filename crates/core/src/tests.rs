// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

#[cfg(test)]
mod integration_tests {
    use crate::diagnostics::{DiagnosticLog, Fault};
    use crate::group::{GroupId, GroupMap, GroupSpec};
    use crate::handler::{FailingHandler, HandlerError, NoopHandler};
    use crate::metrics::{DispatchMetrics, DispatchObserver};
    use crate::peripheral::{ClockDomain, ExtiPeripheral};
    use crate::peripherals::SimBoard;
    use crate::{
        ConfigError, Edge, LineConfig, LineController, LineId, Port, Priority, PriorityGrouping,
        Pull,
    };
    use std::sync::{Arc, Mutex};

    fn line(n: u8) -> LineId {
        LineId::new(n).unwrap()
    }

    struct Rig {
        board: Arc<SimBoard>,
        controller: LineController<SimBoard>,
        log: Arc<DiagnosticLog>,
        metrics: Arc<DispatchMetrics>,
    }

    fn rig_with(board: SimBoard) -> Rig {
        let board = Arc::new(board);
        let log = Arc::new(DiagnosticLog::new());
        let metrics = Arc::new(DispatchMetrics::new());
        let controller = LineController::new(board.clone()).with_diagnostics(log.clone());
        controller.add_observer(metrics.clone());
        Rig {
            board,
            controller,
            log,
            metrics,
        }
    }

    fn rig() -> Rig {
        rig_with(SimBoard::stm32())
    }

    /// Group 5..9 on the STM32 layout.
    const SHARED: GroupId = GroupId(23);

    fn recording(
        trace: &Arc<Mutex<Vec<LineId>>>,
    ) -> impl FnMut(LineId) -> Result<(), HandlerError> + Send + 'static {
        let trace = trace.clone();
        move |l: LineId| -> Result<(), HandlerError> {
            trace.lock().unwrap().push(l);
            Ok(())
        }
    }

    #[test]
    fn test_every_pending_line_acknowledged_individually() {
        let rig = rig();
        let trace = Arc::new(Mutex::new(Vec::new()));
        for n in [5, 6, 8] {
            rig.controller
                .register_line(
                    LineConfig::new(line(n), Edge::Rising, Pull::None, Priority::new(1, 0)),
                    recording(&trace),
                )
                .unwrap();
            rig.controller.enable(line(n)).unwrap();
            rig.board.assert_line(line(n));
        }

        let report = rig.controller.dispatch(SHARED);
        assert_eq!(report.serviced, vec![line(5), line(6), line(8)]);
        assert_eq!(*trace.lock().unwrap(), vec![line(5), line(6), line(8)]);
        for n in [5, 6, 8] {
            assert!(!rig.controller.is_pending(line(n)));
            assert_eq!(rig.metrics.get_acks_for(line(n)), 1);
        }
        assert_eq!(rig.metrics.get_acks(), 3);
        assert!(rig.log.is_empty());
    }

    #[test]
    fn test_unasserted_members_are_not_touched() {
        let rig = rig();
        let trace = Arc::new(Mutex::new(Vec::new()));
        for n in [5, 7] {
            rig.controller
                .register_line(
                    LineConfig::new(line(n), Edge::Both, Pull::Down, Priority::new(2, 0)),
                    recording(&trace),
                )
                .unwrap();
            rig.controller.enable(line(n)).unwrap();
        }
        rig.board.assert_line(line(7));

        let report = rig.controller.dispatch(SHARED);
        assert_eq!(report.serviced, vec![line(7)]);
        assert_eq!(rig.metrics.get_acks_for(line(5)), 0);
    }

    #[test]
    fn test_disabled_member_cleared_without_handler() {
        let rig = rig();
        let trace = Arc::new(Mutex::new(Vec::new()));
        for n in [5, 6] {
            rig.controller
                .register_line(
                    LineConfig::new(line(n), Edge::Rising, Pull::None, Priority::new(1, 0)),
                    recording(&trace),
                )
                .unwrap();
            rig.board.assert_line(line(n));
        }
        rig.controller.enable(line(5)).unwrap();
        assert!(rig.controller.is_pending(line(6)));

        let report = rig.controller.dispatch(SHARED);
        assert_eq!(report.serviced, vec![line(5)]);
        assert_eq!(report.masked, vec![line(6)]);
        assert_eq!(report.acknowledged(), 2);
        assert_eq!(*trace.lock().unwrap(), vec![line(5)]);
        assert!(!rig.controller.is_pending(line(5)));
        assert!(!rig.controller.is_pending(line(6)));
        assert_eq!(rig.metrics.get_acks_for(line(6)), 1);
        assert!(rig.log.is_empty());
    }

    #[test]
    fn test_failing_handler_does_not_block_siblings() {
        let rig = rig();
        let trace = Arc::new(Mutex::new(Vec::new()));
        rig.controller
            .register_line(
                LineConfig::new(line(5), Edge::Rising, Pull::None, Priority::new(1, 0)),
                FailingHandler::new("sensor offline"),
            )
            .unwrap();
        rig.controller
            .register_line(
                LineConfig::new(line(6), Edge::Rising, Pull::None, Priority::new(1, 0)),
                recording(&trace),
            )
            .unwrap();
        for n in [5, 6] {
            rig.controller.enable(line(n)).unwrap();
            rig.board.assert_line(line(n));
        }

        let report = rig.controller.dispatch(SHARED);
        assert_eq!(report.failed, vec![line(5)]);
        assert_eq!(*trace.lock().unwrap(), vec![line(6)]);
        assert!(!rig.controller.is_pending(line(5)));
        assert!(!rig.controller.is_pending(line(6)));

        let faults = rig.log.faults();
        assert_eq!(faults.len(), 1);
        assert_eq!(
            faults[0].to_string(),
            "handler for EXTI5 failed: EXTI5: sensor offline"
        );
        assert_eq!(rig.metrics.get_faults(), 1);
    }

    #[test]
    fn test_panicking_handler_is_contained() {
        let rig = rig();
        rig.controller
            .register_line(
                LineConfig::new(line(9), Edge::Falling, Pull::Up, Priority::new(0, 0)),
                |_l: LineId| -> Result<(), HandlerError> { panic!("boom") },
            )
            .unwrap();
        rig.controller.enable(line(9)).unwrap();

        for round in 1..=2 {
            rig.board.assert_line(line(9));
            let report = rig.controller.dispatch(SHARED);
            assert_eq!(report.failed, vec![line(9)]);
            assert!(!rig.controller.is_pending(line(9)));
            assert_eq!(rig.log.len(), round);
        }
        match &rig.log.faults()[0] {
            Fault::Handler { error, .. } => assert!(error.message().contains("boom")),
            other => panic!("unexpected fault {:?}", other),
        }
    }

    #[test]
    fn test_unhandled_line_is_cleared_and_reported() {
        let rig = rig();
        rig.board.enable_interrupt_line(line(12), Edge::Rising);
        rig.board.assert_line(line(12));

        let report = rig.controller.dispatch(GroupId(40));
        assert_eq!(report.unhandled, vec![line(12)]);
        assert!(report.serviced.is_empty());
        assert!(!rig.controller.is_pending(line(12)));
        assert_eq!(
            rig.log.faults(),
            vec![Fault::Config {
                error: ConfigError::UnhandledLine(line(12))
            }]
        );
        assert_eq!(rig.metrics.get_unhandled(), 1);
    }

    #[test]
    fn test_spurious_dispatch_is_harmless() {
        let rig = rig();
        rig.controller
            .register_line(
                LineConfig::new(line(3), Edge::Rising, Pull::None, Priority::new(1, 0)),
                NoopHandler,
            )
            .unwrap();
        rig.controller.enable(line(3)).unwrap();

        let report = rig.controller.dispatch(GroupId(9));
        assert!(report.is_empty());
        assert_eq!(rig.metrics.get_handler_calls(), 0);
        assert_eq!(rig.metrics.get_dispatches(), 1);
    }

    #[test]
    fn test_duplicate_registration_keeps_original_handler() {
        let rig = rig();
        let first = Arc::new(Mutex::new(Vec::new()));
        let second = Arc::new(Mutex::new(Vec::new()));
        let config = LineConfig::new(line(2), Edge::Rising, Pull::None, Priority::new(1, 0));
        rig.controller
            .register_line(config, recording(&first))
            .unwrap();
        assert_eq!(
            rig.controller.register_line(
                config.on_port(Port::B),
                recording(&second)
            ),
            Err(ConfigError::AlreadyRegistered(line(2)))
        );
        assert_eq!(rig.board.syscfg.port_for(line(2)), Port::A);

        rig.controller.enable(line(2)).unwrap();
        rig.board.assert_line(line(2));
        rig.controller.dispatch(GroupId(8));
        assert_eq!(*first.lock().unwrap(), vec![line(2)]);
        assert!(second.lock().unwrap().is_empty());
    }

    #[test]
    fn test_enable_unregistered_has_no_side_effects() {
        let rig = rig();
        assert_eq!(
            rig.controller.enable(line(4)),
            Err(ConfigError::NotRegistered(line(4)))
        );
        assert!(!rig.board.exti.is_unmasked(line(4)));
        assert!(!rig.board.nvic.is_enabled(GroupId(10)));
        assert!(rig.controller.enabled_clocks().is_empty());
    }

    #[test]
    fn test_clocks_enabled_once_per_domain() {
        let rig = rig();
        for n in [0, 1, 2] {
            rig.controller
                .register_line(
                    LineConfig::new(line(n), Edge::Rising, Pull::None, Priority::new(1, 0))
                        .on_port(Port::B),
                    NoopHandler,
                )
                .unwrap();
        }
        assert_eq!(
            rig.controller.enabled_clocks(),
            vec![ClockDomain::GpioPort(Port::B), ClockDomain::Syscfg]
        );
        assert!(rig.board.rcc.is_enabled(ClockDomain::GpioPort(Port::B)));
        assert!(!rig.board.rcc.is_enabled(ClockDomain::GpioPort(Port::A)));
    }

    #[test]
    fn test_priority_checked_against_hardware_grouping() {
        // Two tier bits: preemption 0..=3, sub-priority 0..=3.
        let grouping = PriorityGrouping::new(2).unwrap();
        let rig = rig_with(SimBoard::new(GroupMap::stm32(), grouping));
        let ok = LineConfig::new(line(0), Edge::Rising, Pull::None, Priority::new(3, 3));
        let bad = LineConfig::new(line(1), Edge::Rising, Pull::None, Priority::new(4, 0));
        rig.controller.register_line(ok, NoopHandler).unwrap();
        assert_eq!(
            rig.controller.register_line(bad, NoopHandler),
            Err(ConfigError::InvalidPriority {
                priority: Priority::new(4, 0),
                grouping: 2
            })
        );
        rig.controller.enable(line(0)).unwrap();
        assert_eq!(
            rig.board.group_priority(GroupId(6)),
            Some(Priority::new(3, 3))
        );
    }

    #[test]
    fn test_line_outside_every_group_rejected() {
        let groups = GroupMap::new(vec![GroupSpec {
            id: GroupId(50),
            name: "only-0".to_string(),
            lines: [line(0)].into_iter().collect(),
        }])
        .unwrap();
        let rig = rig_with(SimBoard::new(groups, PriorityGrouping::default()));
        assert_eq!(
            rig.controller.register_line(
                LineConfig::new(line(1), Edge::Rising, Pull::None, Priority::new(1, 0)),
                NoopHandler
            ),
            Err(ConfigError::InvalidLine(1))
        );
    }

    #[derive(Debug, Default)]
    struct Order(Mutex<Vec<String>>);

    impl DispatchObserver for Order {
        fn on_handler_invoked(&self, line: LineId) {
            self.0.lock().unwrap().push(format!("run {}", line));
        }

        fn on_line_acknowledged(&self, line: LineId) {
            self.0.lock().unwrap().push(format!("ack {}", line));
        }
    }

    #[test]
    fn test_ack_order_is_observable() {
        for (order, expected) in [
            (crate::AckOrder::BeforeHandler, ["ack EXTI3", "run EXTI3"]),
            (crate::AckOrder::AfterHandler, ["run EXTI3", "ack EXTI3"]),
        ] {
            let board = Arc::new(SimBoard::stm32());
            let observer = Arc::new(Order::default());
            let controller = LineController::new(board.clone())
                .with_diagnostics(Arc::new(DiagnosticLog::new()))
                .with_ack_order(order);
            controller.add_observer(observer.clone());
            controller
                .register_line(
                    LineConfig::new(line(3), Edge::Rising, Pull::None, Priority::new(1, 0)),
                    NoopHandler,
                )
                .unwrap();
            controller.enable(line(3)).unwrap();
            board.assert_line(line(3));
            controller.dispatch(GroupId(9));
            assert_eq!(*observer.0.lock().unwrap(), expected);
        }
    }
}
