use std::error::Error;
use std::sync::Arc;
use std::{env, process, thread};

use log::{error, info, LevelFilter};
use rppal::gpio::{Gpio, InputPin, OutputPin};
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::iterator::Signals;
use syslog::Facility;

use garage_door_controller::alert::WebhookSink;
use garage_door_controller::config::{self, Config};
use garage_door_controller::http::{self, Controller, Credentials};
use garage_door_controller::monitor::DoorStateMonitor;
use garage_door_controller::relay::{GpioRelay, Relay};
use garage_door_controller::sensor::GpioSensor;
use garage_door_controller::shutdown::Shutdown;

fn main() -> Result<(), Box<dyn Error>> {
    init_logging();

    let path = env::args()
        .nth(1)
        .unwrap_or_else(|| config::DEFAULT_PATH.to_string());
    let config = match Config::load(&path) {
        Ok(config) => config,
        Err(err) => {
            error!("{}: {}", path, err);
            process::exit(1);
        }
    };

    info!(
        "loaded {}: door pin {}, relay pin {}, {} user(s)",
        path,
        config.door_pin,
        config.relay_pin,
        config.users.len()
    );

    let mut signals = Signals::new(&[SIGINT, SIGTERM])?;

    let server = match http::Server::new(config.listen.as_str()) {
        Ok(server) => Arc::new(server),
        Err(err) => {
            error!("Unable to start http server on {}: {}", config.listen, err);
            process::exit(1);
        }
    };

    // Without the pins there is nothing to monitor or control
    let (door, relay_pin) = match setup_gpio(&config) {
        Ok(pins) => pins,
        Err(err) => {
            error!("Unable to set up GPIO: {}", err);
            process::exit(1);
        }
    };
    let relay = Relay::new(
        GpioRelay::new(relay_pin, config.relay_active_low),
        config.pulse_on,
        config.pulse_settle,
    )?;

    let sensor = Arc::new(GpioSensor::new(door));
    let sink = WebhookSink::new(config.webhook_url.clone(), config.alert_timeout);
    let mut monitor = DoorStateMonitor::new(sensor, sink, config.alert_policy(), config.poll_interval);
    let controller = Arc::new(Controller::new(
        monitor.probe(),
        relay,
        Credentials::new(config.users.clone()),
    ));
    let shutdown = Shutdown::new();
    let mut threads = Vec::new();

    // Monitor thread
    {
        let shutdown = shutdown.clone();
        let thread = thread::spawn(move || monitor.run(&shutdown));
        threads.push(thread);
    }

    // Handle HTTP requests
    info!("http server running on {}", config.listen);
    {
        let server = Arc::clone(&server);
        let controller = Arc::clone(&controller);
        let thread = thread::spawn(move || {
            server.handle_requests(&*controller);
            info!("server thread exiting");
        });
        threads.push(thread);
    }

    // Wait for signals to exit
    if let Some(signal) = signals.forever().next() {
        info!("received signal {}, shutting down", signal);
    }
    shutdown.trigger();
    server.shutdown();

    for thread in threads {
        let _ = thread.join();
    }
    controller.release_relay();

    Ok(())
}

fn init_logging() {
    if let Err(err) = syslog::init(
        Facility::LOG_DAEMON,
        LevelFilter::Info,
        Some(env!("CARGO_PKG_NAME")),
    ) {
        env_logger::Builder::new()
            .filter_level(LevelFilter::Info)
            .parse_default_env()
            .init();
        error!("unable to connect to syslog, logging to stderr: {}", err);
    }
}

fn setup_gpio(config: &Config) -> rppal::gpio::Result<(InputPin, OutputPin)> {
    let gpio = Gpio::new()?;
    let door_pin = gpio.get(config.door_pin)?.into_input_pulldown();
    let relay_pin = gpio.get(config.relay_pin)?.into_output();
    Ok((door_pin, relay_pin))
}
