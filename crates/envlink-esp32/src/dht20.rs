//! DHT20 temperature/humidity sensor on I2C.
//!
//! Measurement sequence: trigger (`0xAC 0x33 0x00`), wait 80 ms, read the
//! 7-byte frame (status, 5 data bytes, CRC-8). Error codes follow the
//! numbering of the common Arduino DHT20 driver.

use envlink_core::model::Reading;
use envlink_core::sensor::{Sensor, SensorError};
use esp_idf_hal::delay::{FreeRtos, BLOCK};
use esp_idf_hal::i2c::I2cDriver;
use log::debug;

/// Fixed bus address.
pub const DHT20_ADDRESS: u8 = 0x38;

const CMD_TRIGGER: [u8; 3] = [0xAC, 0x33, 0x00];
const MEASURE_DELAY_MS: u32 = 80;
const STATUS_BUSY: u8 = 0x80;
const STATUS_CALIBRATED: u8 = 0x18;

pub const ERROR_CHECKSUM: i8 = -10;
pub const ERROR_CONNECT: i8 = -11;
pub const ERROR_BYTES_ALL_ZERO: i8 = -13;
pub const ERROR_READ_TIMEOUT: i8 = -14;

/// DHT20 driver.
pub struct Dht20<'d> {
    i2c: I2cDriver<'d>,
}

impl<'d> Dht20<'d> {
    pub fn new(i2c: I2cDriver<'d>) -> Self {
        Self { i2c }
    }

    fn status(&mut self) -> Result<u8, SensorError> {
        let mut status = [0u8; 1];
        self.i2c
            .read(DHT20_ADDRESS, &mut status, BLOCK)
            .map_err(|_| SensorError::NotConnected)?;
        Ok(status[0])
    }
}

impl Sensor for Dht20<'_> {
    fn begin(&mut self) -> bool {
        match self.status() {
            Ok(status) => {
                if status & STATUS_CALIBRATED != STATUS_CALIBRATED {
                    debug!("DHT20 status {status:#04x}, calibration bits not set");
                }
                true
            }
            Err(_) => false,
        }
    }

    fn read(&mut self) -> Result<Reading, SensorError> {
        self.i2c
            .write(DHT20_ADDRESS, &CMD_TRIGGER, BLOCK)
            .map_err(|_| SensorError::Status(ERROR_CONNECT))?;
        FreeRtos::delay_ms(MEASURE_DELAY_MS);

        let mut frame = [0u8; 7];
        self.i2c
            .read(DHT20_ADDRESS, &mut frame, BLOCK)
            .map_err(|_| SensorError::Status(ERROR_CONNECT))?;
        decode_frame(&frame)
    }
}

/// Convert a raw measurement frame to physical units.
pub fn decode_frame(frame: &[u8; 7]) -> Result<Reading, SensorError> {
    if frame.iter().all(|b| *b == 0) {
        return Err(SensorError::Status(ERROR_BYTES_ALL_ZERO));
    }
    if frame[0] & STATUS_BUSY != 0 {
        return Err(SensorError::Status(ERROR_READ_TIMEOUT));
    }
    if crc8(&frame[..6]) != frame[6] {
        return Err(SensorError::Status(ERROR_CHECKSUM));
    }

    let raw_humidity =
        (u32::from(frame[1]) << 12) | (u32::from(frame[2]) << 4) | (u32::from(frame[3]) >> 4);
    let raw_temperature =
        (u32::from(frame[3] & 0x0F) << 16) | (u32::from(frame[4]) << 8) | u32::from(frame[5]);

    const SCALE: f32 = (1u32 << 20) as f32;
    Ok(Reading::new(
        raw_temperature as f32 * 200.0 / SCALE - 50.0,
        raw_humidity as f32 * 100.0 / SCALE,
    ))
}

/// CRC-8, polynomial 0x31, initial value 0xFF.
pub fn crc8(data: &[u8]) -> u8 {
    data.iter().fold(0xFF, |mut crc, byte| {
        crc ^= byte;
        for _ in 0..8 {
            crc = if crc & 0x80 != 0 {
                (crc << 1) ^ 0x31
            } else {
                crc << 1
            };
        }
        crc
    })
}
