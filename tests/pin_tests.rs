use std::cell::Cell;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::rc::Rc;

use nix::errno::Errno;
use sysgpio::{Direction, EdgeDetect, GpioClass, GpioError, RetryPolicy, SysfsPin};
use tempfile::TempDir;

const PIN: u32 = 12;

fn fake_sysfs() -> (TempDir, GpioClass) {
    let dir = tempfile::tempdir().expect("tempdir");
    fs::create_dir_all(dir.path().join(format!("gpio{PIN}"))).unwrap();
    fs::write(dir.path().join(format!("gpio{PIN}/value")), "").unwrap();
    let class = GpioClass::new(dir.path());
    (dir, class)
}

fn read(dir: &TempDir, rel: &str) -> String {
    fs::read_to_string(dir.path().join(rel)).unwrap()
}

fn write(dir: &TempDir, rel: &str, contents: &str) {
    fs::write(dir.path().join(rel), contents).unwrap();
}

#[test]
fn export_as_output() {
    let (dir, class) = fake_sysfs();
    let pin = class.export(PIN, Direction::Output).unwrap();

    assert_eq!(read(&dir, "export"), "12");
    assert_eq!(read(&dir, "gpio12/direction"), "out");
    assert_eq!(pin.pin(), PIN);
    assert_eq!(pin.direction(), Direction::Output);
}

#[test]
fn export_as_output_high() {
    let (dir, class) = fake_sysfs();
    let _pin = class.export(PIN, Direction::OutputHigh).unwrap();

    assert_eq!(read(&dir, "export"), "12");
    assert_eq!(read(&dir, "gpio12/direction"), "high");
}

#[test]
fn export_as_input() {
    let (dir, class) = fake_sysfs();
    let pin = class.export(PIN, Direction::Input).unwrap();

    assert_eq!(read(&dir, "export"), "12");
    assert_eq!(read(&dir, "gpio12/direction"), "in");
    assert_eq!(pin.edge(), EdgeDetect::None);
    assert!(!pin.has_handler());
}

#[test]
fn wrong_direction_is_rejected_before_export() {
    let (dir, _class) = fake_sysfs();
    let err = "wrong-direction".parse::<Direction>().unwrap_err();

    assert!(matches!(err, GpioError::InvalidDirection(_)));
    assert!(!dir.path().join("export").exists());
    assert!(!dir.path().join("gpio12/direction").exists());
}

#[test]
fn export_failure_propagates() {
    let dir = tempfile::tempdir().unwrap();
    let class = GpioClass::new(dir.path().join("missing"));
    let err = class.export(PIN, Direction::Input).unwrap_err();

    assert!(matches!(err, GpioError::Io { .. }));
    assert!(!err.is_busy());
}

#[test]
fn missing_value_node_is_not_retried_and_unexports() {
    let dir = tempfile::tempdir().unwrap();
    let class = GpioClass::new(dir.path()).with_retry(RetryPolicy {
        max_retries: 3,
        delay_ms: 10_000,
    });
    let err = class.export(PIN, Direction::Input).unwrap_err();

    assert!(matches!(err, GpioError::Io { .. }));
    assert!(!err.is_permission_denied());
    assert_eq!(read(&dir, "unexport"), "12");
}

#[test]
fn release_unexports() {
    let (dir, class) = fake_sysfs();
    let pin = class.export(PIN, Direction::Input).unwrap();
    pin.release().unwrap();

    assert_eq!(read(&dir, "unexport"), "12");
}

#[test]
fn close_unexports() {
    let (dir, class) = fake_sysfs();
    let pin = class.export(PIN, Direction::Output).unwrap();
    pin.close().unwrap();

    assert_eq!(read(&dir, "unexport"), "12");
}

#[test]
fn drop_unexports() {
    let (dir, class) = fake_sysfs();
    let pin = class.export(PIN, Direction::Input).unwrap();
    drop(pin);

    assert_eq!(read(&dir, "unexport"), "12");
}

#[test]
fn drop_tolerates_missing_sysfs() {
    let (dir, class) = fake_sysfs();
    let pin = class.export(PIN, Direction::Input).unwrap();
    fs::remove_dir_all(dir.path()).unwrap();

    drop(pin);
}

#[test]
fn set_active_low() {
    let (dir, class) = fake_sysfs();
    let mut pin = class.export(PIN, Direction::Output).unwrap();

    pin.set_active_low(true).unwrap();
    assert_eq!(read(&dir, "gpio12/active_low"), "1");
    assert!(pin.is_active_low().unwrap());

    pin.set_active_low(false).unwrap();
    assert_eq!(read(&dir, "gpio12/active_low"), "0");
    assert!(!pin.is_active_low().unwrap());
}

#[test]
fn get_active_low() {
    let (dir, class) = fake_sysfs();
    let pin = class.export(PIN, Direction::Output).unwrap();

    write(&dir, "gpio12/active_low", "1");
    assert!(pin.is_active_low().unwrap());

    write(&dir, "gpio12/active_low", "0\n");
    assert!(!pin.is_active_low().unwrap());
}

#[test]
fn reads_high_value() {
    let (dir, class) = fake_sysfs();
    write(&dir, "gpio12/value", "1");
    let pin = class.export(PIN, Direction::Input).unwrap();

    assert!(pin.is_high().unwrap());
    assert!(!pin.is_low().unwrap());
}

#[test]
fn reads_low_value() {
    let (dir, class) = fake_sysfs();
    write(&dir, "gpio12/value", "0\n");
    let pin = class.export(PIN, Direction::Input).unwrap();

    assert!(!pin.is_high().unwrap());
    assert!(pin.is_low().unwrap());
}

#[test]
fn every_read_hits_the_value_node() {
    let (dir, class) = fake_sysfs();
    write(&dir, "gpio12/value", "0");
    let pin = class.export(PIN, Direction::Input).unwrap();
    assert!(pin.is_low().unwrap());

    write(&dir, "gpio12/value", "1");
    assert!(pin.is_high().unwrap());
}

#[test]
fn unparseable_value_is_an_error() {
    let (dir, class) = fake_sysfs();
    write(&dir, "gpio12/value", "bogus");
    let pin = class.export(PIN, Direction::Input).unwrap();

    assert!(matches!(
        pin.is_high().unwrap_err(),
        GpioError::InvalidValue(_)
    ));
}

#[test]
fn set_high_and_low() {
    let (dir, class) = fake_sysfs();
    let mut pin = class.export(PIN, Direction::Output).unwrap();

    pin.set_high().unwrap();
    assert_eq!(read(&dir, "gpio12/value"), "1");

    pin.set_low().unwrap();
    assert_eq!(read(&dir, "gpio12/value"), "0");
}

#[test]
fn set_low_overwrites_prior_content() {
    let (dir, class) = fake_sysfs();
    write(&dir, "gpio12/value", "1");
    let mut pin = class.export(PIN, Direction::Output).unwrap();

    pin.set_low().unwrap();
    assert_eq!(read(&dir, "gpio12/value"), "0");
}

#[test]
fn set_interrupt_writes_edge() {
    let (dir, class) = fake_sysfs();
    let mut pin = class.export(PIN, Direction::Input).unwrap();

    for edge in [EdgeDetect::Rising, EdgeDetect::Falling, EdgeDetect::Both] {
        pin.set_interrupt(edge, |_: bool| {}).unwrap();
        assert_eq!(read(&dir, "gpio12/edge"), edge.as_str());
        assert_eq!(pin.edge(), edge);
    }
    assert!(pin.has_handler());
}

#[test]
fn unknown_edge_text_is_rejected() {
    let (dir, class) = fake_sysfs();
    let mut pin = class.export(PIN, Direction::Input).unwrap();
    pin.set_interrupt(EdgeDetect::Rising, |_: bool| {}).unwrap();

    let err = "wrong-edge".parse::<EdgeDetect>().unwrap_err();
    assert!(matches!(err, GpioError::InvalidEdge(_)));
    assert_eq!(read(&dir, "gpio12/edge"), "rising");
}

#[test]
fn interrupt_on_output_is_rejected() {
    let (dir, class) = fake_sysfs();
    let mut pin = class.export(PIN, Direction::Output).unwrap();
    let err = pin.set_interrupt(EdgeDetect::Both, |_: bool| {}).unwrap_err();

    assert!(matches!(err, GpioError::InvalidState(_)));
    assert!(!dir.path().join("gpio12/edge").exists());
    assert!(!pin.has_handler());
}

#[test]
fn clear_interrupt_removes_handler() {
    let (dir, class) = fake_sysfs();
    let mut pin = class.export(PIN, Direction::Input).unwrap();
    let calls = Rc::new(Cell::new(0));

    let counter = calls.clone();
    pin.set_interrupt(EdgeDetect::Both, move |_: bool| counter.set(counter.get() + 1))
        .unwrap();
    pin.clear_interrupt().unwrap();

    assert_eq!(read(&dir, "gpio12/edge"), "none");
    assert_eq!(pin.edge(), EdgeDetect::None);
    assert!(!pin.trigger(true));
    assert_eq!(calls.get(), 0);
}

#[test]
fn set_interrupt_replaces_handler() {
    let (_dir, class) = fake_sysfs();
    let mut pin = class.export(PIN, Direction::Input).unwrap();
    let first = Rc::new(Cell::new(0));
    let second = Rc::new(Cell::new(0));

    let counter = first.clone();
    pin.set_interrupt(EdgeDetect::Rising, move |_: bool| counter.set(counter.get() + 1))
        .unwrap();
    let counter = second.clone();
    pin.set_interrupt(EdgeDetect::Falling, move |_: bool| counter.set(counter.get() + 1))
        .unwrap();

    assert!(pin.trigger(false));
    assert_eq!(first.get(), 0);
    assert_eq!(second.get(), 1);
}

#[test]
fn trigger_passes_level() {
    let (_dir, class) = fake_sysfs();
    let mut pin = class.export(PIN, Direction::Input).unwrap();
    let seen = Rc::new(Cell::new(None));

    let last = seen.clone();
    pin.set_interrupt(EdgeDetect::Both, move |active: bool| last.set(Some(active)))
        .unwrap();

    pin.trigger(true);
    assert_eq!(seen.get(), Some(true));
    pin.trigger(false);
    assert_eq!(seen.get(), Some(false));
}

#[test]
fn trigger_without_handler() {
    let (_dir, class) = fake_sysfs();
    let mut pin = class.export(PIN, Direction::Input).unwrap();

    assert!(!pin.trigger(true));
}

fn io_error(kind: io::ErrorKind) -> GpioError {
    GpioError::Io {
        path: PathBuf::from("gpio12/value"),
        source: io::Error::from(kind),
    }
}

#[test]
fn retry_recovers_from_permission_race() {
    let policy = RetryPolicy {
        max_retries: 3,
        delay_ms: 0,
    };
    let mut attempts = 0;
    let result = policy.run("GPIO 12", || {
        attempts += 1;
        if attempts < 3 {
            Err(io_error(io::ErrorKind::PermissionDenied))
        } else {
            Ok(attempts)
        }
    });

    assert_eq!(result.unwrap(), 3);
}

#[test]
fn retry_gives_up_after_max_retries() {
    let policy = RetryPolicy {
        max_retries: 3,
        delay_ms: 0,
    };
    let mut attempts = 0;
    let result: Result<(), GpioError> = policy.run("GPIO 12", || {
        attempts += 1;
        Err(io_error(io::ErrorKind::PermissionDenied))
    });

    assert!(result.unwrap_err().is_permission_denied());
    assert_eq!(attempts, 4);
}

#[test]
fn retry_ignores_other_failures() {
    let policy = RetryPolicy::default();
    let mut attempts = 0;
    let result: Result<(), GpioError> = policy.run("GPIO 12", || {
        attempts += 1;
        Err(io_error(io::ErrorKind::NotFound))
    });

    assert!(result.is_err());
    assert_eq!(attempts, 1);
}

#[test]
fn busy_export_is_classified() {
    let busy = GpioError::Io {
        path: PathBuf::from("export"),
        source: io::Error::from_raw_os_error(Errno::EBUSY as i32),
    };

    assert!(busy.is_busy());
    assert!(!busy.is_permission_denied());
    assert!(!io_error(io::ErrorKind::PermissionDenied).is_busy());
}

#[test]
#[ignore = "needs /sys/class/gpio"]
fn export_on_real_sysfs() {
    let pin = SysfsPin::new(PIN, Direction::Input).unwrap();
    pin.is_high().unwrap();
    pin.release().unwrap();
}
