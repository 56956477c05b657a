//! In-memory meter used when no physical device is attached

use std::sync::Mutex;

use chrono::Utc;

use super::frame::{
    crc_valid, with_crc, READ_HOLDING_REGISTERS, READ_INPUT_REGISTERS, WRITE_SINGLE_REGISTER,
};
use super::{
    register_address, MeterClient, MeterError, MeterResult, PhaseReading, Reading,
    MAX_REGISTERS_PER_READ,
};

/// Size of the holding register bank (full 16-bit address space)
const REGISTER_COUNT: usize = 1 << 16;

/// Protocol address where the live measurements are mirrored (register 44001)
pub const MEASUREMENT_BASE: usize = 4000;

/// Modbus "illegal function" exception
const ILLEGAL_FUNCTION: u8 = 0x01;
/// Modbus "illegal data address" exception
const ILLEGAL_DATA_ADDRESS: u8 = 0x02;

struct MeterState {
    registers: Vec<u16>,
    energy_kwh: f64,
}

/// Simulated three-phase meter.
///
/// Each basic read produces a fresh sample and mirrors it into the register
/// bank at 44001.. (voltage x10, current x100, power W, frequency x100,
/// power factor x1000).
pub struct SimulatedMeter {
    device_address: u8,
    state: Mutex<MeterState>,
}

impl SimulatedMeter {
    pub fn new(device_address: u8) -> Self {
        Self {
            device_address,
            state: Mutex::new(MeterState {
                registers: vec![0; REGISTER_COUNT],
                energy_kwh: 1250.0,
            }),
        }
    }

    pub fn device_address(&self) -> u8 {
        self.device_address
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MeterState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Overwrite a register, by 4xxxx number or raw address
    pub fn set_register(&self, register: u32, value: u16) -> MeterResult<()> {
        let address = checked_address(register)?;
        self.lock().registers[address] = value;
        Ok(())
    }

    fn sample(&self) -> Reading {
        let voltage_v = jitter(230.0, 2.0);
        let current_a = jitter(12.0, 1.5);
        let power_factor = jitter(0.95, 0.02).min(1.0);
        let frequency_hz = jitter(50.0, 0.05);
        let power_kw = voltage_v * current_a * power_factor / 1000.0;

        let mut state = self.lock();
        state.energy_kwh += power_kw / 3600.0;
        let energy_kwh = state.energy_kwh;

        let mirror = [
            (voltage_v * 10.0) as u16,
            (current_a * 100.0) as u16,
            (power_kw * 1000.0) as u16,
            (frequency_hz * 100.0) as u16,
            (power_factor * 1000.0) as u16,
        ];
        state.registers[MEASUREMENT_BASE..MEASUREMENT_BASE + mirror.len()]
            .copy_from_slice(&mirror);

        Reading {
            timestamp: Utc::now(),
            voltage_v: round(voltage_v, 1),
            current_a: round(current_a, 2),
            power_kw: round(power_kw, 3),
            energy_kwh: round(energy_kwh, 3),
            frequency_hz: round(frequency_hz, 2),
            power_factor: round(power_factor, 3),
            phases: None,
        }
    }

    fn handle_frame(&self, command: &[u8]) -> MeterResult<Vec<u8>> {
        // A real device stays silent on frames it cannot or should not answer
        if command.len() < 4 || !crc_valid(command) || command[0] != self.device_address {
            return Err(MeterError::NoResponse);
        }

        let function = command[1];
        let body = &command[2..command.len() - 2];

        match function {
            READ_HOLDING_REGISTERS | READ_INPUT_REGISTERS if body.len() == 4 => {
                let address = u16::from_be_bytes([body[0], body[1]]) as usize;
                let count = u16::from_be_bytes([body[2], body[3]]) as usize;
                if count == 0
                    || count > MAX_REGISTERS_PER_READ as usize
                    || address + count > REGISTER_COUNT
                {
                    return Ok(self.exception(function, ILLEGAL_DATA_ADDRESS));
                }

                let state = self.lock();
                let mut reply = vec![self.device_address, function, (count * 2) as u8];
                for value in &state.registers[address..address + count] {
                    reply.extend_from_slice(&value.to_be_bytes());
                }
                Ok(with_crc(reply))
            }
            WRITE_SINGLE_REGISTER if body.len() == 4 => {
                let address = u16::from_be_bytes([body[0], body[1]]) as usize;
                let value = u16::from_be_bytes([body[2], body[3]]);
                self.lock().registers[address] = value;
                Ok(command.to_vec())
            }
            _ => Ok(self.exception(function, ILLEGAL_FUNCTION)),
        }
    }

    fn exception(&self, function: u8, code: u8) -> Vec<u8> {
        with_crc(vec![self.device_address, function | 0x80, code])
    }
}

impl Default for SimulatedMeter {
    fn default() -> Self {
        Self::new(1)
    }
}

impl MeterClient for SimulatedMeter {
    fn read_basic(&self) -> MeterResult<Reading> {
        Ok(self.sample())
    }

    fn read_detailed(&self) -> MeterResult<Reading> {
        let mut reading = self.sample();
        let phases = ["L1", "L2", "L3"]
            .iter()
            .map(|phase| {
                let voltage_v = jitter(reading.voltage_v, 1.0);
                let current_a = jitter(reading.current_a / 3.0, 0.3);
                PhaseReading {
                    phase: phase.to_string(),
                    voltage_v: round(voltage_v, 1),
                    current_a: round(current_a, 2),
                    power_kw: round(voltage_v * current_a * reading.power_factor / 1000.0, 3),
                }
            })
            .collect();
        reading.phases = Some(phases);
        Ok(reading)
    }

    fn read_register(&self, register: u32) -> MeterResult<u16> {
        let address = checked_address(register)?;
        Ok(self.lock().registers[address])
    }

    fn read_registers(&self, start: u32, count: u16) -> MeterResult<Vec<u16>> {
        if count == 0 || count > MAX_REGISTERS_PER_READ {
            return Err(MeterError::Frame(format!(
                "register count must be 1..={}, got {}",
                MAX_REGISTERS_PER_READ, count
            )));
        }
        let address = checked_address(start)?;
        let end = address + count as usize;
        if end > REGISTER_COUNT {
            return Err(MeterError::InvalidRegister(start));
        }
        Ok(self.lock().registers[address..end].to_vec())
    }

    fn send_raw_command(&self, command: &[u8]) -> MeterResult<Vec<u8>> {
        self.handle_frame(command)
    }
}

fn checked_address(register: u32) -> MeterResult<usize> {
    let address = register_address(register) as usize;
    if address >= REGISTER_COUNT {
        return Err(MeterError::InvalidRegister(register));
    }
    Ok(address)
}

fn jitter(center: f64, spread: f64) -> f64 {
    center + (rand::random::<f64>() * 2.0 - 1.0) * spread
}

fn round(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}
