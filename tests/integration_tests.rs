#[cfg(test)]
mod tests {
    use m6117_watchdog::ioctl::{watchdog_info, Command, OptionFlags, Reply, SetOptionFlags};
    use m6117_watchdog::sim::{Access, SimulatedChip};
    use m6117_watchdog::keepalive::DEFAULT_PERIOD;
    use m6117_watchdog::{
        encode, start_automatic_keep_alive, CloseOutcome, Params, PingOutcome, Register, Signal,
        SystemEvent, SystemEventListener, TimeoutSeconds, Watchdog, WatchdogDevice, WatchdogState,
    };
    use log::info;
    use nix::errno::Errno;
    use std::panic::{catch_unwind, AssertUnwindSafe};
    use std::sync::{Arc, Mutex, Once, PoisonError};
    use std::thread::{self, sleep};
    use std::time::Duration;

    static INIT: Once = Once::new();

    #[cfg(test)]
    fn init_logger(){
        INIT.call_once(|| {
            let _ = env_logger::builder().is_test(true).try_init();
        });
    }

    fn params(line: &str) -> Params {
        // Start from nowayout=0 whatever the build features say.
        let mut params = Params { nowayout: false, ..Params::default() };
        for arg in line.split_whitespace() {
            params.apply(arg).expect("valid parameter");
        }
        params
    }

    fn load(line: &str) -> WatchdogDevice<SimulatedChip> {
        WatchdogDevice::init(SimulatedChip::new(), params(line)).expect("driver loads")
    }

    /// Number of complete unlock ... lock sequences the chip has seen.
    fn bracket_count(chip: &SimulatedChip) -> usize {
        chip.writes().filter(|&w| w == (0x13, 0xc5)).count()
    }

    #[test]
    fn test_out_of_range_timeouts_touch_nothing() {
        init_logger();
        let mut wd = Watchdog::new(SimulatedChip::new());
        for seconds in [0, 513, 1000, u32::MAX] {
            assert!(wd.start(seconds).is_err());
            assert!(wd.set_timeout(seconds).is_err());
        }
        assert!(wd.io().accesses().is_empty());
        assert_eq!(wd.state(), WatchdogState::Disarmed);

        let device = load("");
        let mut handle = device.open().unwrap();
        device.with_watchdog(|wd| wd.io_mut().clear_log());
        for seconds in [0, -1, 513] {
            assert_eq!(handle.ioctl(Command::SetTimeout(seconds)), Err(Errno::EINVAL));
        }
        assert!(device.with_watchdog(|wd| wd.io().accesses().is_empty()));
        assert_eq!(device.timeout(), TimeoutSeconds::DEFAULT);
        handle.write(b"V").unwrap();
    }

    #[test]
    fn test_stop_is_a_no_op_when_disarmed() {
        init_logger();
        let mut wd = Watchdog::new(SimulatedChip::new());
        wd.stop();
        assert!(wd.io().accesses().is_empty());

        wd.start(10).unwrap();
        wd.io_mut().clear_log();
        wd.stop();
        assert_eq!(
            wd.io().accesses(),
            &[
                Access::Write { index: 0x13, value: 0xc5 },
                Access::Read { index: 0x37, value: 0x40 },
                Access::Write { index: 0x37, value: 0x00 },
                Access::Write { index: 0x13, value: 0x00 },
            ]
        );
        assert_eq!(wd.state(), WatchdogState::Disarmed);
        assert!(!wd.io().is_enabled());
        assert!(!wd.io().is_counting());
    }

    #[test]
    fn test_ping_toggles_enable_while_armed() {
        init_logger();
        let mut wd = Watchdog::new(SimulatedChip::new());
        wd.start(5).unwrap();
        wd.io_mut().clear_log();
        assert_eq!(wd.ping(), PingOutcome::Reloaded);
        let writes: Vec<_> = wd.io().writes().collect();
        assert_eq!(writes, vec![(0x13, 0xc5), (0x37, 0x00), (0x37, 0x40), (0x13, 0x00)]);
        assert_eq!(wd.state(), WatchdogState::Armed);
        assert_eq!(wd.io().rejected_writes(), 0);
    }

    #[test]
    fn test_ping_while_disarmed_warns() {
        init_logger();
        let mut wd = Watchdog::new(SimulatedChip::new());
        assert_eq!(wd.ping(), PingOutcome::NotRunning);
        assert!(wd.io().accesses().is_empty());
        assert_eq!(wd.state(), WatchdogState::Disarmed);
    }

    #[test]
    fn test_restart_overwrites_timeout() {
        init_logger();
        let mut wd = Watchdog::new(SimulatedChip::new());
        wd.start(10).unwrap();
        wd.start(300).unwrap();
        let expected = encode(TimeoutSeconds::new(300).unwrap());
        assert_eq!(wd.io().counter(), expected);
        assert_eq!(wd.timeout().get(), 300);
        assert!(wd.is_running());
    }

    #[test]
    fn test_signal_select_keeps_low_nibble() {
        init_logger();
        let chip = SimulatedChip::new().with_register(Register::SignalSelect, 0xab);
        let mut wd = Watchdog::new(chip);
        wd.start(60).unwrap();
        assert_eq!(wd.io().register(Register::SignalSelect), 0xdb);
        assert_eq!(wd.io().selected_signal(), Some(Signal::SystemReset));
    }

    #[test]
    fn test_open_write_magic_close() {
        init_logger();
        let device = load("timeout=60 early_enable=0");
        assert_eq!(device.state(), WatchdogState::Disarmed);
        assert!(device.with_watchdog(|wd| wd.io().accesses().is_empty()));

        let mut handle = device.open().unwrap();
        assert_eq!(device.state(), WatchdogState::Armed);
        let counter = device.with_watchdog(|wd| wd.io().counter());
        assert_eq!(counter, encode(TimeoutSeconds::new(60).unwrap()));

        device.with_watchdog(|wd| wd.io_mut().clear_log());
        assert_eq!(handle.write(b"V"), Ok(1));
        assert!(handle.expects_close());
        assert_eq!(device.with_watchdog(|wd| bracket_count(wd.io())), 1);

        assert_eq!(handle.close(), CloseOutcome::Stopped);
        assert_eq!(device.state(), WatchdogState::Disarmed);
        assert!(!device.is_open());
    }

    #[test]
    fn test_nowayout_close_leaves_watchdog_armed() {
        init_logger();
        let device = load("nowayout=1");
        let handle = device.open().unwrap();
        assert_eq!(handle.close(), CloseOutcome::UnexpectedClose);
        assert_eq!(device.state(), WatchdogState::Armed);

        // Even the magic character cannot stop it.
        let mut handle = device.open().unwrap();
        handle.write(b"V").unwrap();
        assert_eq!(handle.close(), CloseOutcome::UnexpectedClose);
        assert!(device.is_running());
    }

    #[test]
    fn test_close_without_magic_character() {
        init_logger();
        let device = load("");
        let mut handle = device.open().unwrap();
        handle.write(b"V").unwrap();
        // A later write without 'V' withdraws the magic close.
        handle.write(b"ping").unwrap();
        assert!(!handle.expects_close());
        drop(handle);
        assert!(device.is_running());
        assert!(!device.is_open());
    }

    #[test]
    fn test_empty_write_does_not_ping() {
        init_logger();
        let device = load("");
        let mut handle = device.open().unwrap();
        handle.write(b"xxVxx").unwrap();
        device.with_watchdog(|wd| wd.io_mut().clear_log());
        assert_eq!(handle.write(b""), Ok(0));
        assert!(handle.expects_close());
        assert!(device.with_watchdog(|wd| wd.io().accesses().is_empty()));
        assert_eq!(handle.close(), CloseOutcome::Stopped);
    }

    #[test]
    fn test_shutdown_stops_exactly_once() {
        init_logger();
        let device = load("nowayout=1");
        let hook = device.shutdown_hook();
        let mut handle = device.open().unwrap();
        handle.write(b"V").unwrap();
        device.with_watchdog(|wd| wd.io_mut().clear_log());

        hook.on_system_event(SystemEvent::Shutdown);
        assert_eq!(device.state(), WatchdogState::Disarmed);
        hook.on_system_event(SystemEvent::Halt);
        assert_eq!(device.with_watchdog(|wd| bracket_count(wd.io())), 1);

        // The next close has nothing left to stop.
        handle.close();
        assert!(!device.is_running());
    }

    #[test]
    fn test_exclusive_open() {
        init_logger();
        let device = load("");
        let mut first = device.open().unwrap();
        assert_eq!(device.open().err(), Some(Errno::EBUSY));
        first.write(b"V").unwrap();
        first.close();
        let second = device.open();
        assert!(second.is_ok());
    }

    #[test]
    fn test_early_enable_arms_at_init() {
        init_logger();
        let device = load("early_enable=1 timeout=45 signal=nmi");
        assert!(device.params().early_enable);
        assert_eq!(device.params().signal, Signal::Nmi);
        assert!(device.is_running());
        device.with_watchdog(|wd| {
            assert_eq!(wd.io().counter(), encode(TimeoutSeconds::new(45).unwrap()));
            assert_eq!(wd.io().selected_signal(), Some(Signal::Nmi));
        });
    }

    #[test]
    fn test_init_rejects_bad_timeout() {
        init_logger();
        for line in ["timeout=0", "timeout=513"] {
            assert!(WatchdogDevice::init(SimulatedChip::new(), params(line)).is_err());
        }
    }

    #[test]
    fn test_ioctl_commands() {
        init_logger();
        let device = load("timeout=20");
        let mut handle = device.open().unwrap();

        match handle.ioctl(Command::GetSupport) {
            Ok(Reply::Support(info)) => {
                assert_eq!(info, watchdog_info::m6117());
                assert_eq!(info.identity(), "ALi M6117 WDT");
                assert!(info.supports(&OptionFlags::SetTimeout));
                assert!(info.supports(&OptionFlags::KeepalivePing));
            }
            other => panic!("unexpected reply {other:?}"),
        }
        assert_eq!(handle.ioctl(Command::GetStatus), Ok(Reply::Value(0)));
        assert_eq!(handle.ioctl(Command::GetBootStatus), Ok(Reply::Value(0)));
        assert_eq!(handle.ioctl(Command::GetTimeout), Ok(Reply::Value(20)));
        assert_eq!(handle.ioctl(Command::KeepAlive), Ok(Reply::Done));

        // Setting the timeout replies with the value now in effect.
        assert_eq!(handle.ioctl(Command::SetTimeout(90)), Ok(Reply::Value(90)));
        assert_eq!(handle.ioctl(Command::GetTimeout), Ok(Reply::Value(90)));

        let disable = SetOptionFlags::DisableCard.value();
        let enable = SetOptionFlags::EnableCard.value();
        assert_eq!(handle.ioctl(Command::SetOptions(disable)), Ok(Reply::Done));
        assert!(!device.is_running());
        assert_eq!(handle.ioctl(Command::SetOptions(enable)), Ok(Reply::Done));
        assert!(device.is_running());
        assert_eq!(device.timeout().get(), 90);
        assert_eq!(handle.ioctl(Command::SetOptions(0x4)), Err(Errno::EINVAL));

        let raw = Command::GetTimeout.request_code();
        assert_eq!(handle.ioctl_raw(raw, 0), Ok(Reply::Value(90)));
        assert_eq!(handle.ioctl_raw(0x5401, 0), Err(Errno::ENOTTY));
        handle.write(b"V").unwrap();
    }

    #[test]
    fn test_set_timeout_arms_a_stopped_watchdog() {
        init_logger();
        let device = load("");
        let mut handle = device.open().unwrap();
        handle.ioctl(Command::SetOptions(SetOptionFlags::DisableCard.value())).unwrap();
        assert!(!device.is_running());
        handle.ioctl(Command::SetTimeout(15)).unwrap();
        assert!(device.is_running());
        handle.write(b"V").unwrap();
    }

    #[test]
    fn test_unattended_watchdog_fires() {
        init_logger();
        let device = load("timeout=2");
        let mut handle = device.open().unwrap();
        device.with_watchdog(|wd| {
            assert_eq!(wd.io_mut().elapse(Duration::from_millis(1500)), None);
        });
        handle.write(b"\n").unwrap();
        device.with_watchdog(|wd| {
            assert_eq!(wd.io_mut().elapse(Duration::from_millis(1500)), None);
            assert_eq!(wd.io_mut().elapse(Duration::from_millis(600)), Some(Signal::SystemReset));
        });
        handle.write(b"V").unwrap();
    }

    #[test]
    fn test_device_unload_stops_watchdog() {
        init_logger();
        let device = load("nowayout=1 early_enable=1");
        let mut handle = device.open().unwrap();
        assert!(device.is_running());
        drop(device);
        // The handle still shares the controller, which must have been stopped.
        assert_eq!(handle.keep_alive(), PingOutcome::NotRunning);
    }

    #[test]
    fn test_automatic_keepalive() {
        init_logger();
        let device = load("");
        let handle = Arc::new(Mutex::new(device.open().unwrap()));
        device.with_watchdog(|wd| wd.io_mut().clear_log());

        let keepalive = start_automatic_keep_alive(Arc::clone(&handle), Duration::from_millis(5));
        sleep(Duration::from_millis(50));
        keepalive.stop().expect("Error joining thread.");

        let pings = device.with_watchdog(|wd| bracket_count(wd.io()));
        info!("{pings} pings sent by the keepalive thread.");
        assert!(pings >= 1);

        handle.lock().unwrap().write(b"V").unwrap();
        drop(handle);
        assert!(!device.is_running());
    }

    #[test]
    fn test_keepalive_gives_up_on_stopped_watchdog() {
        init_logger();
        let device = load("");
        let handle = Arc::new(Mutex::new(device.open().unwrap()));
        handle
            .lock()
            .unwrap()
            .ioctl(Command::SetOptions(SetOptionFlags::DisableCard.value()))
            .unwrap();

        let keepalive = start_automatic_keep_alive(Arc::clone(&handle), Duration::from_millis(1));
        let mut waited = 0;
        while !keepalive.is_finished() && waited < 1000 {
            sleep(Duration::from_millis(5));
            waited += 1;
        }
        assert!(keepalive.is_finished());
        keepalive.stop().expect("Error joining thread.");
    }

    #[test]
    fn test_disable_card_overrides_nowayout() {
        init_logger();
        let device = load("nowayout=1");
        let mut handle = device.open().unwrap();
        let disable = SetOptionFlags::DisableCard.value();
        assert_eq!(handle.ioctl(Command::SetOptions(disable)), Ok(Reply::Done));
        assert!(!device.is_running());
        device.with_watchdog(|wd| assert!(!wd.io().is_enabled()));

        // Closing is still an unexpected close, there is just nothing left running.
        assert_eq!(handle.close(), CloseOutcome::UnexpectedClose);
        assert!(!device.is_running());
    }

    #[test]
    fn test_panic_while_holding_the_controller() {
        init_logger();
        let device = load("");
        let mut handle = device.open().unwrap();
        let result = catch_unwind(AssertUnwindSafe(|| {
            device.with_watchdog(|wd| {
                if wd.is_running() {
                    panic!("controller user crashed");
                }
            })
        }));
        assert!(result.is_err());

        // The mutex is poisoned, the watchdog must still answer.
        assert!(device.is_running());
        assert_eq!(handle.keep_alive(), PingOutcome::Reloaded);
        device.with_watchdog(|wd| {
            assert!(wd.io().is_locked());
            assert_eq!(wd.io().rejected_writes(), 0);
        });
        handle.write(b"V").unwrap();
        assert_eq!(handle.close(), CloseOutcome::Stopped);
    }

    #[test]
    fn test_keepalive_survives_poisoned_handle() {
        init_logger();
        let device = load("");
        let handle = Arc::new(Mutex::new(device.open().unwrap()));
        let shared = Arc::clone(&handle);
        let crashed = thread::spawn(move || {
            let _guard = shared.lock().unwrap();
            panic!("supervisor crashed while holding the handle");
        })
        .join();
        assert!(crashed.is_err());
        assert!(handle.is_poisoned());
        device.with_watchdog(|wd| wd.io_mut().clear_log());

        let keepalive = start_automatic_keep_alive(Arc::clone(&handle), Duration::from_millis(5));
        sleep(Duration::from_millis(30));
        keepalive.stop().expect("Error joining thread.");
        assert!(device.with_watchdog(|wd| bracket_count(wd.io())) >= 1);

        handle.lock().unwrap_or_else(PoisonError::into_inner).write(b"V").unwrap();
        drop(handle);
        assert!(!device.is_running());
    }

    #[test]
    fn test_keepalive_default_period_stops_promptly() {
        init_logger();
        let device = load("");
        let handle = Arc::new(Mutex::new(device.open().unwrap()));
        device.with_watchdog(|wd| wd.io_mut().clear_log());

        // The first ping is immediate, stopping does not wait for the period.
        let keepalive = start_automatic_keep_alive(Arc::clone(&handle), DEFAULT_PERIOD);
        keepalive.stop().expect("Error joining thread.");
        assert_eq!(device.with_watchdog(|wd| bracket_count(wd.io())), 1);

        handle.lock().unwrap().write(b"V").unwrap();
    }
}
