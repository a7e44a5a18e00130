use std::time::Duration;

use rppal::i2c::I2c;
use tracing::{debug, info};

use crate::config::LIS3MDL_ADDR;
use crate::error::SensorError;
use crate::heading::MagnetometerSample;
use crate::sensor_stream::MagneticFieldProvider;

// LIS3MDL Register addresses
const WHO_AM_I: u8 = 0x0F;
const CTRL_REG1: u8 = 0x20;
const CTRL_REG2: u8 = 0x21;
const CTRL_REG3: u8 = 0x22;
const CTRL_REG4: u8 = 0x23;
const CTRL_REG5: u8 = 0x24;
const STATUS_REG: u8 = 0x27;
const OUT_X_L: u8 = 0x28;

const LIS3MDL_ID: u8 = 0x3D;
/// STATUS_REG: new X, Y and Z data available.
const ZYXDA: u8 = 0x08;
/// CTRL_REG3 operating mode bits.
const MODE_CONTINUOUS: u8 = 0x00;
const MODE_POWER_DOWN: u8 = 0x03;
/// Time for the first conversion after configuration.
const STARTUP_DELAY: Duration = Duration::from_millis(100);

/// LIS3MDL magnetometer on the Pi's I2C bus.
///
/// The bus is only opened while subscribed; between sessions the chip sits in
/// power-down mode.
pub struct Lis3mdlMagnetometer {
    address: u16,
    i2c: Option<I2c>,
    last: Option<MagnetometerSample>,
}

impl Lis3mdlMagnetometer {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self::with_address(LIS3MDL_ADDR)
    }

    pub fn with_address(address: u16) -> Self {
        Self {
            address,
            i2c: None,
            last: None,
        }
    }

    fn open(&self) -> Result<I2c, rppal::i2c::Error> {
        let mut i2c = I2c::new()?;
        i2c.set_slave_address(self.address)?;
        Ok(i2c)
    }
}

/// Byte-wide register access to the chip.
trait RegisterBus {
    type Error: std::fmt::Display;

    fn read_register(&self, register: u8) -> Result<u8, Self::Error>;
    fn write_register(&self, register: u8, value: u8) -> Result<(), Self::Error>;
}

impl RegisterBus for I2c {
    type Error = rppal::i2c::Error;

    fn read_register(&self, register: u8) -> Result<u8, Self::Error> {
        self.smbus_read_byte(register)
    }

    fn write_register(&self, register: u8, value: u8) -> Result<(), Self::Error> {
        self.smbus_write_byte(register, value)
    }
}

fn read_axes<B: RegisterBus>(bus: &B) -> Result<MagnetometerSample, B::Error> {
    // Read 6 bytes starting from OUT_X_L
    let mut data = [0u8; 6];
    for (i, item) in data.iter_mut().enumerate() {
        *item = bus.read_register(OUT_X_L + i as u8)?;
    }

    // Convert to signed 16-bit values (little endian)
    Ok(MagnetometerSample::new(
        i16::from_le_bytes([data[0], data[1]]) as f64,
        i16::from_le_bytes([data[2], data[3]]) as f64,
        i16::from_le_bytes([data[4], data[5]]) as f64,
    ))
}

/// Configure continuous conversion and read the first sample.
///
/// Any failure after configuration starts puts the chip back into power-down.
fn start_conversions<B: RegisterBus>(bus: &B) -> Result<MagnetometerSample, SensorError> {
    let first = configure(bus);
    if first.is_err() {
        power_down(bus);
    }
    first
}

fn configure<B: RegisterBus>(bus: &B) -> Result<MagnetometerSample, SensorError> {
    // CTRL_REG1: Temperature enabled, Ultra-high performance mode (X,Y), ODR = 80 Hz
    // CTRL_REG2: Full scale ±4 gauss
    // CTRL_REG4: Ultra-high performance mode (Z-axis), little endian
    // CTRL_REG5: Block data update enabled
    for (register, value) in [
        (CTRL_REG1, 0xFC),
        (CTRL_REG2, 0x00),
        (CTRL_REG3, MODE_CONTINUOUS),
        (CTRL_REG4, 0x0C),
        (CTRL_REG5, 0x40),
    ] {
        bus.write_register(register, value).map_err(unavailable)?;
    }

    // Blocks the subscribing task once, for a single conversion period.
    std::thread::sleep(STARTUP_DELAY);

    let status = bus.read_register(STATUS_REG).map_err(unavailable)?;
    if status & ZYXDA == 0 {
        return Err(SensorError::Unavailable(
            "magnetometer hardware not responding (no data ready)".into(),
        ));
    }
    read_axes(bus).map_err(unavailable)
}

fn power_down<B: RegisterBus>(bus: &B) {
    if let Err(e) = bus.write_register(CTRL_REG3, MODE_POWER_DOWN) {
        debug!(error = %e, "Failed to power down magnetometer");
    }
}

fn unavailable(e: impl std::fmt::Display) -> SensorError {
    SensorError::Unavailable(e.to_string())
}

fn read_failed(e: impl std::fmt::Display) -> SensorError {
    SensorError::ReadFailed(e.to_string())
}

impl MagneticFieldProvider for Lis3mdlMagnetometer {
    fn subscribe(&mut self, interval: Duration) -> Result<(), SensorError> {
        let i2c = self.open().map_err(unavailable)?;

        let who_am_i = i2c.read_register(WHO_AM_I).map_err(unavailable)?;
        if who_am_i != LIS3MDL_ID {
            return Err(SensorError::Unavailable(format!(
                "wrong device ID: 0x{:02X}, expected 0x{:02X}",
                who_am_i, LIS3MDL_ID
            )));
        }

        let first = start_conversions(&i2c)?;

        info!(
            address = format_args!("0x{:02X}", self.address),
            interval_ms = interval.as_millis() as u64,
            "Compass (LIS3MDL) initialized"
        );
        self.i2c = Some(i2c);
        self.last = Some(first);
        Ok(())
    }

    fn read_sample(&mut self) -> Result<MagnetometerSample, SensorError> {
        let i2c = self
            .i2c
            .as_ref()
            .ok_or_else(|| SensorError::ReadFailed("magnetometer not subscribed".into()))?;

        // A tick that lands between conversions repeats the previous sample.
        let status = i2c.read_register(STATUS_REG).map_err(read_failed)?;
        if status & ZYXDA == 0
            && let Some(last) = self.last
        {
            return Ok(last);
        }

        let sample = read_axes(i2c).map_err(read_failed)?;
        self.last = Some(sample);
        Ok(sample)
    }

    fn unsubscribe(&mut self) {
        if let Some(i2c) = self.i2c.take() {
            power_down(&i2c);
        }
        self.last = None;
    }
}
