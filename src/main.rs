use std::cell::Cell;
use std::rc::Rc;

use log::info;

use sysgpio::{AppConfig, EdgeDetect, GpioClass, GpioError, WaitLoop};

fn main() -> Result<(), GpioError> {
    env_logger::init();

    let config_path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("SYSGPIO_CONFIG").ok())
        .unwrap_or_else(|| "config.json".to_string());
    let config = AppConfig::load_from_file(&config_path)
        .unwrap_or_else(|e| panic!("Failed to load config: {e}"));

    let class = GpioClass::new(config.sysfs_root()).with_retry(config.retry);
    let mut waiter = WaitLoop::new();
    let events = Rc::new(Cell::new(0usize));

    let mut pins = Vec::with_capacity(config.gpios.len());
    for id in config.pin_ids() {
        let pin_cfg = &config.gpios[&id];
        let mut pin = class.export(id, pin_cfg.direction)?;

        if let Some(active_low) = pin_cfg.active_low {
            pin.set_active_low(active_low)?;
        }

        if pin_cfg.edge != EdgeDetect::None {
            let name = pin_cfg.name.clone();
            let events = events.clone();
            let resume = waiter.resume_handle();
            let max_events = config.max_events;

            pin.set_interrupt(pin_cfg.edge, move |active: bool| {
                events.set(events.get() + 1);
                info!(
                    "{name} (GPIO {id}) is {}",
                    if active { "high" } else { "low" }
                );
                if max_events.is_some_and(|max| events.get() >= max) {
                    resume.resume();
                }
            })?;
        }

        info!(
            "GPIO {id} ({}) exported as '{}', edge '{}'",
            pin_cfg.name,
            pin_cfg.direction,
            pin.edge()
        );
        pins.push(pin);
    }

    if pins.iter().any(|p| p.has_handler()) {
        info!("Waiting for edges on {} pins...", pins.len());
        let dispatched = waiter.wait(&mut pins)?;
        info!("Stopped after {dispatched} edges");
    } else {
        info!("No input pin has edge detection configured, nothing to wait for");
    }

    for pin in pins {
        pin.release()?;
    }

    Ok(())
}
