//! envlink node firmware for ESP32-S3.
//!
//! Two threads share the latest sensor values:
//! - `sampler` reads the DHT20 every second
//! - `session` keeps WiFi and the MQTT session up, publishes telemetry and
//!   answers RPC requests (LED switch)

use anyhow::Context;
use envlink_core::sampler::SensorSampler;
use envlink_core::{RpcDispatcher, SessionController, SharedEnvironment};
use envlink_esp32::dht20::Dht20;
use envlink_esp32::gpio::LedOutput;
use envlink_esp32::mqtt::EspMqttTransport;
use envlink_esp32::wifi::EspLink;
use envlink_esp32::FreeRtosClock;
use esp_idf_hal::gpio::AnyOutputPin;
use esp_idf_hal::i2c::{I2cConfig, I2cDriver};
use esp_idf_hal::prelude::*;
use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::log::EspLogger;
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use log::{error, info};
use std::thread;

const SAMPLER_STACK: usize = 8 * 1024;
const SESSION_STACK: usize = 16 * 1024;

fn main() -> anyhow::Result<()> {
    esp_idf_svc::sys::link_patches();
    EspLogger::initialize_default();

    info!("envlink node starting...");

    let config = envlink_esp32::config::from_build_env().context("invalid build configuration")?;

    let peripherals = Peripherals::take()?;
    let sysloop = EspSystemEventLoop::take()?;
    let nvs = EspDefaultNvsPartition::take()?;

    // Sensor bus: SDA on GPIO11, SCL on GPIO12
    let i2c = I2cDriver::new(
        peripherals.i2c0,
        peripherals.pins.gpio11,
        peripherals.pins.gpio12,
        &I2cConfig::new().baudrate(100.kHz().into()),
    )?;

    // SAFETY: the LED pin is not claimed through `peripherals.pins` anywhere else
    let led_pin = unsafe { AnyOutputPin::new(i32::from(config.device.led_pin)) };
    let led = LedOutput::new(led_pin)?;

    let link = EspLink::new(peripherals.modem, sysloop, Some(nvs), &config.link)?;

    let env = SharedEnvironment::new();

    let sampler_env = env.clone();
    let timing = config.timing.clone();
    thread::Builder::new()
        .name("sampler".to_string())
        .stack_size(SAMPLER_STACK)
        .spawn(move || {
            let mut sampler = SensorSampler::new(Dht20::new(i2c), sampler_env, &timing);
            if let Err(e) = sampler.run(&FreeRtosClock) {
                error!("sampler stopped: {e}");
            }
        })?;

    let session = thread::Builder::new()
        .name("session".to_string())
        .stack_size(SESSION_STACK)
        .spawn(move || {
            let mut controller = SessionController::new(
                link,
                EspMqttTransport::new(&config.device.name, &config.timing),
                FreeRtosClock,
                RpcDispatcher::with_led(led),
                env,
                &config,
            );
            if let Err(e) = controller.run() {
                error!("session controller stopped: {e}");
            }
        })?;

    let _ = session.join();
    error!("session thread exited");
    Ok(())
}
