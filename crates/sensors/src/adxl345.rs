//! ADXL345 accelerometer over Linux i2c-dev

use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::os::unix::io::AsRawFd;
use tracing::{debug, info};

use crate::accel::{AccelConfig, AccelError, AccelSample, AccelSource, STANDARD_GRAVITY};

/// `I2C_SLAVE` ioctl request from linux/i2c-dev.h
const I2C_SLAVE: u64 = 0x0703;

const REG_DEVID: u8 = 0x00;
const REG_BW_RATE: u8 = 0x2C;
const REG_POWER_CTL: u8 = 0x2D;
const REG_DATA_FORMAT: u8 = 0x31;
const REG_DATAX0: u8 = 0x32;

const DEVICE_ID: u8 = 0xE5;
/// 100 Hz output data rate
const BW_RATE_100HZ: u8 = 0x0A;
/// Measurement mode
const POWER_CTL_MEASURE: u8 = 0x08;
/// FULL_RES, +/-16 g
const DATA_FORMAT_FULL_RES_16G: u8 = 0x0B;
/// Full resolution scale factor (g per LSB)
const SCALE_G_PER_LSB: f64 = 0.004;

/// ADXL345 driver holding the open i2c-dev handle
pub struct Adxl345 {
    bus: File,
}

impl Adxl345 {
    /// Open the bus, select the device, and start measuring
    pub fn open(config: &AccelConfig) -> Result<Self, AccelError> {
        let bus = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&config.i2c_device)
            .map_err(|e| AccelError::Open(format!("{}: {}", config.i2c_device, e)))?;

        let ret = unsafe { libc::ioctl(bus.as_raw_fd(), I2C_SLAVE as _, config.address as libc::c_ulong) };
        if ret < 0 {
            return Err(AccelError::Open(format!(
                "I2C_SLAVE {:#04x}: {}",
                config.address,
                std::io::Error::last_os_error()
            )));
        }

        let mut driver = Self { bus };

        let id = driver.read_register(REG_DEVID)?;
        if id != DEVICE_ID {
            return Err(AccelError::WrongDevice(id));
        }

        driver.write_register(REG_BW_RATE, BW_RATE_100HZ)?;
        driver.write_register(REG_DATA_FORMAT, DATA_FORMAT_FULL_RES_16G)?;
        driver.write_register(REG_POWER_CTL, POWER_CTL_MEASURE)?;

        info!(
            "ADXL345 initialized on {} at {:#04x}",
            config.i2c_device, config.address
        );
        Ok(driver)
    }

    fn write_register(&mut self, register: u8, value: u8) -> Result<(), AccelError> {
        self.bus
            .write_all(&[register, value])
            .map_err(|e| AccelError::Read(e.to_string()))
    }

    fn read_register(&mut self, register: u8) -> Result<u8, AccelError> {
        let mut buf = [0u8; 1];
        self.read_block(register, &mut buf)?;
        Ok(buf[0])
    }

    fn read_block(&mut self, register: u8, buf: &mut [u8]) -> Result<(), AccelError> {
        self.bus
            .write_all(&[register])
            .and_then(|_| self.bus.read_exact(buf))
            .map_err(|e| AccelError::Read(e.to_string()))
    }
}

/// Convert the six DATAX0..DATAZ1 bytes into m/s^2
pub fn decode_sample(raw: &[u8; 6]) -> AccelSample {
    let axis = |lo: u8, hi: u8| i16::from_le_bytes([lo, hi]) as f64 * SCALE_G_PER_LSB * STANDARD_GRAVITY;
    AccelSample::new(axis(raw[0], raw[1]), axis(raw[2], raw[3]), axis(raw[4], raw[5]))
}

impl AccelSource for Adxl345 {
    fn read(&mut self) -> Result<AccelSample, AccelError> {
        let mut raw = [0u8; 6];
        self.read_block(REG_DATAX0, &mut raw)?;
        let sample = decode_sample(&raw);
        debug!(x = sample.x, y = sample.y, z = sample.z, "ADXL345 sample");
        Ok(sample)
    }
}

impl Drop for Adxl345 {
    fn drop(&mut self) {
        // Back to standby; the file handle closes itself
        let _ = self.write_register(REG_POWER_CTL, 0x00);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_one_g_on_z() {
        // 250 LSB = 1 g at 4 mg/LSB
        let raw = [0, 0, 0, 0, 250, 0];
        let sample = decode_sample(&raw);
        assert!((sample.z - STANDARD_GRAVITY).abs() < 1e-9);
        assert_eq!(sample.x, 0.0);
    }

    #[test]
    fn test_decode_negative_axis() {
        let raw = (-500i16).to_le_bytes();
        let sample = decode_sample(&[raw[0], raw[1], 0, 0, 0, 0]);
        assert!((sample.x + 2.0 * STANDARD_GRAVITY).abs() < 1e-9);
    }
}
