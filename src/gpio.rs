use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::os::fd::{AsFd, BorrowedFd};
use std::path::{Path, PathBuf};

use log::{debug, warn};

use crate::config::{DEFAULT_SYSFS_ROOT, Direction, EdgeDetect, RetryPolicy};
use crate::error::GpioError;

/// Receives the level of a pin each time the wait loop sees an edge on it.
pub trait EdgeHandler {
    fn on_edge(&mut self, active: bool);
}

impl<F: FnMut(bool)> EdgeHandler for F {
    fn on_edge(&mut self, active: bool) {
        self(active)
    }
}

pub type BoxedHandler = Box<dyn EdgeHandler>;

/// The sysfs gpio class directory, usually `/sys/class/gpio`.
#[derive(Debug, Clone)]
pub struct GpioClass {
    root: PathBuf,
    retry: RetryPolicy,
}

impl Default for GpioClass {
    fn default() -> Self {
        Self::new(DEFAULT_SYSFS_ROOT)
    }
}

impl GpioClass {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn retry(&self) -> RetryPolicy {
        self.retry
    }

    pub fn pin_dir(&self, pin: u32) -> PathBuf {
        self.root.join(format!("gpio{pin}"))
    }

    fn export_path(&self) -> PathBuf {
        self.root.join("export")
    }

    fn unexport_path(&self) -> PathBuf {
        self.root.join("unexport")
    }

    /// Exports `pin`, opens its value node and writes its direction.
    ///
    /// An export rejected with `EBUSY` only logs a warning: the line is most
    /// likely left over from a previous run. Opening the value node and
    /// writing the direction are retried while the kernel is still fixing up
    /// permissions of the freshly created nodes.
    ///
    /// If opening fails, the line is unexported again only when this call
    /// exported it; a line that was already exported is left alone.
    pub fn export(&self, pin: u32, direction: Direction) -> Result<SysfsPin, GpioError> {
        let exported_here = match write_attr(&self.export_path(), &pin.to_string()) {
            Err(e) if e.is_busy() => {
                warn!("GPIO {pin} is already exported, may be in use.");
                false
            }
            Err(e) => return Err(e),
            Ok(()) => {
                debug!("exported GPIO {pin}");
                true
            }
        };

        self.open_exported(pin, direction, exported_here)
    }

    fn open_exported(
        &self,
        pin: u32,
        direction: Direction,
        exported_here: bool,
    ) -> Result<SysfsPin, GpioError> {
        let mut export = ExportGuard {
            pin,
            unexport: self.unexport_path(),
            armed: exported_here,
        };

        let dir = self.pin_dir(pin);
        let value = self
            .retry
            .run(&format!("GPIO {pin}"), || open_value(&dir, direction))?;
        // from here on the handle owns the line either way
        export.armed = true;

        Ok(SysfsPin {
            direction,
            edge: EdgeDetect::None,
            value_path: dir.join("value"),
            dir,
            handler: None,
            value,
            export,
        })
    }
}

fn write_attr(path: &Path, contents: &str) -> Result<(), GpioError> {
    fs::write(path, contents).map_err(|e| GpioError::io(path, e))
}

fn open_value(dir: &Path, direction: Direction) -> Result<File, GpioError> {
    let path = dir.join("value");
    let file = match direction {
        Direction::Input => File::open(&path),
        Direction::Output | Direction::OutputHigh => {
            OpenOptions::new().read(true).write(true).open(&path)
        }
    }
    .map_err(|e| GpioError::io(&path, e))?;

    write_attr(&dir.join("direction"), direction.as_str())?;
    Ok(file)
}

/// Owns the kernel export of one line. Only the pin number and the unexport
/// path are kept, so dropping it never touches the value channel.
struct ExportGuard {
    pin: u32,
    unexport: PathBuf,
    armed: bool,
}

impl ExportGuard {
    fn release(mut self) -> Result<(), GpioError> {
        self.unexport_now()
    }

    /// Writes `unexport` and disarms the drop path.
    fn unexport_now(&mut self) -> Result<(), GpioError> {
        self.armed = false;
        write_attr(&self.unexport, &self.pin.to_string())?;
        debug!("unexported GPIO {}", self.pin);
        Ok(())
    }
}

impl Drop for ExportGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        match write_attr(&self.unexport, &self.pin.to_string()) {
            Ok(()) => debug!("unexported GPIO {} on drop", self.pin),
            Err(e) => warn!("Failed to unexport GPIO {} on drop: {e}", self.pin),
        }
    }
}

/// One exported GPIO line with an open value channel.
///
/// The line is unexported by [`SysfsPin::release`] or, failing that, when the
/// handle is dropped.
pub struct SysfsPin {
    direction: Direction,
    edge: EdgeDetect,
    dir: PathBuf,
    value_path: PathBuf,
    handler: Option<BoxedHandler>,
    // fields drop in declaration order, the value channel is closed before unexport
    value: File,
    export: ExportGuard,
}

impl fmt::Debug for SysfsPin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SysfsPin")
            .field("pin", &self.export.pin)
            .field("direction", &self.direction)
            .field("edge", &self.edge)
            .field("has_handler", &self.handler.is_some())
            .finish()
    }
}

impl SysfsPin {
    /// Exports `pin` under `/sys/class/gpio` with the default retry policy.
    pub fn new(pin: u32, direction: Direction) -> Result<Self, GpioError> {
        GpioClass::default().export(pin, direction)
    }

    pub fn pin(&self) -> u32 {
        self.export.pin
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Last edge mode written through this handle.
    pub fn edge(&self) -> EdgeDetect {
        self.edge
    }

    pub fn has_handler(&self) -> bool {
        self.handler.is_some()
    }

    pub fn is_high(&self) -> Result<bool, GpioError> {
        Ok(self.read_value()? != 0)
    }

    pub fn is_low(&self) -> Result<bool, GpioError> {
        Ok(self.read_value()? == 0)
    }

    pub fn set_high(&mut self) -> Result<(), GpioError> {
        self.write_value("1")
    }

    pub fn set_low(&mut self) -> Result<(), GpioError> {
        self.write_value("0")
    }

    /// Inverts the meaning of high and low for both reads and writes.
    pub fn set_active_low(&mut self, active_low: bool) -> Result<(), GpioError> {
        write_attr(
            &self.dir.join("active_low"),
            if active_low { "1" } else { "0" },
        )
    }

    pub fn is_active_low(&self) -> Result<bool, GpioError> {
        let path = self.dir.join("active_low");
        let contents = fs::read_to_string(&path).map_err(|e| GpioError::io(&path, e))?;
        Ok(contents.trim() != "0")
    }

    /// Enables edge detection and installs `handler`, replacing any previous one.
    pub fn set_interrupt<H>(&mut self, edge: EdgeDetect, handler: H) -> Result<(), GpioError>
    where
        H: EdgeHandler + 'static,
    {
        self.set_edge(edge)?;
        self.handler = Some(Box::new(handler));
        Ok(())
    }

    pub fn clear_interrupt(&mut self) -> Result<(), GpioError> {
        self.set_edge(EdgeDetect::None)?;
        self.handler = None;
        Ok(())
    }

    /// Runs the installed handler with `active`. Returns `false` when no
    /// handler is installed.
    pub fn trigger(&mut self, active: bool) -> bool {
        match self.handler.as_mut() {
            Some(handler) => {
                handler.on_edge(active);
                true
            }
            None => {
                warn!("No callback defined for GPIO {}", self.pin());
                false
            }
        }
    }

    /// Closes the value channel and unexports the line.
    pub fn release(self) -> Result<(), GpioError> {
        let SysfsPin { value, export, .. } = self;
        drop(value);
        export.release()
    }

    pub fn close(self) -> Result<(), GpioError> {
        self.release()
    }

    fn set_edge(&mut self, edge: EdgeDetect) -> Result<(), GpioError> {
        if !self.direction.is_input() {
            return Err(GpioError::InvalidState(format!(
                "interrupt can only be set on input pin, GPIO {} is '{}'",
                self.pin(),
                self.direction
            )));
        }

        write_attr(&self.dir.join("edge"), edge.as_str())?;
        self.edge = edge;
        debug!("GPIO {} edge set to {edge}", self.pin());
        Ok(())
    }

    fn read_value(&self) -> Result<i64, GpioError> {
        let mut file = &self.value;
        let mut contents = String::new();
        file.seek(SeekFrom::Start(0))
            .and_then(|_| file.read_to_string(&mut contents))
            .map_err(|e| GpioError::io(&self.value_path, e))?;

        let trimmed = contents.trim();
        trimmed.parse().map_err(|_| {
            GpioError::InvalidValue(format!(
                "GPIO {} value '{trimmed}' is not an integer",
                self.pin()
            ))
        })
    }

    fn write_value(&mut self, value: &str) -> Result<(), GpioError> {
        // File is unbuffered, every write reaches the kernel immediately.
        self.value
            .seek(SeekFrom::Start(0))
            .and_then(|_| self.value.write_all(value.as_bytes()))
            .map_err(|e| GpioError::io(&self.value_path, e))
    }
}

impl AsFd for SysfsPin {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.value.as_fd()
    }
}
