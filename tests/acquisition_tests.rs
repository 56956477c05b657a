//! Acquisition loop tests against scripted meters

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use powermeter::meter::{
    AcquisitionLoop, MeterClient, MeterError, MeterResult, ReadMode, Reading, SimulatedMeter,
};
use tokio::time::sleep;

/// Fails the first `failures` reads, then answers with an increasing voltage
struct FlakyMeter {
    failures: usize,
    calls: AtomicUsize,
}

impl FlakyMeter {
    fn new(failures: usize) -> Self {
        Self {
            failures,
            calls: AtomicUsize::new(0),
        }
    }
}

impl MeterClient for FlakyMeter {
    fn read_basic(&self) -> MeterResult<Reading> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures {
            return Err(MeterError::Timeout);
        }
        Ok(Reading {
            timestamp: Utc::now(),
            voltage_v: 200.0 + call as f64,
            current_a: 1.0,
            power_kw: 0.2,
            energy_kwh: 10.0,
            frequency_hz: 50.0,
            power_factor: 1.0,
            phases: None,
        })
    }

    fn read_register(&self, register: u32) -> MeterResult<u16> {
        Err(MeterError::InvalidRegister(register))
    }

    fn read_registers(&self, _start: u32, _count: u16) -> MeterResult<Vec<u16>> {
        Err(MeterError::NoResponse)
    }

    fn send_raw_command(&self, _command: &[u8]) -> MeterResult<Vec<u8>> {
        Ok(Vec::new())
    }
}

/// Holds the device busy for a while on every read
#[derive(Default)]
struct SlowMeter {
    busy: AtomicBool,
    reads: AtomicUsize,
}

impl MeterClient for SlowMeter {
    fn read_basic(&self) -> MeterResult<Reading> {
        self.busy.store(true, Ordering::SeqCst);
        self.reads.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(300));
        self.busy.store(false, Ordering::SeqCst);
        Err(MeterError::Timeout)
    }

    fn read_register(&self, _register: u32) -> MeterResult<u16> {
        Ok(0)
    }

    fn read_registers(&self, _start: u32, count: u16) -> MeterResult<Vec<u16>> {
        Ok(vec![0; count as usize])
    }

    fn send_raw_command(&self, _command: &[u8]) -> MeterResult<Vec<u8>> {
        Err(MeterError::NoResponse)
    }
}

async fn wait_for<F: Fn() -> bool>(condition: F, within: Duration) -> bool {
    let deadline = Instant::now() + within;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        sleep(Duration::from_millis(10)).await;
    }
    condition()
}

#[tokio::test]
async fn test_no_data_before_first_successful_poll() {
    let acquisition = AcquisitionLoop::new(
        Arc::new(FlakyMeter::new(usize::MAX)),
        ReadMode::Basic,
        Duration::from_millis(10),
    );
    acquisition.start().await;

    assert!(wait_for(|| acquisition.stats().polls_failed >= 3, Duration::from_secs(2)).await);
    assert!(acquisition.get_data().is_none());
    assert_eq!(acquisition.stats().polls_ok, 0);

    acquisition.stop().await;
}

#[tokio::test]
async fn test_recovers_after_failed_polls() {
    let acquisition = AcquisitionLoop::new(
        Arc::new(FlakyMeter::new(2)),
        ReadMode::Basic,
        Duration::from_millis(10),
    );
    acquisition.start().await;

    assert!(wait_for(|| acquisition.stats().polls_ok >= 1, Duration::from_secs(2)).await);
    let stats = acquisition.stats();
    assert_eq!(stats.polls_failed, 2);

    let first = acquisition.get_data().unwrap();
    assert!(first.voltage_v >= 202.0);

    assert!(
        wait_for(
            || acquisition
                .get_data()
                .is_some_and(|r| r.voltage_v > first.voltage_v),
            Duration::from_secs(2)
        )
        .await
    );

    acquisition.stop().await;
}

#[tokio::test]
async fn test_snapshot_survives_stop() {
    let acquisition = AcquisitionLoop::new(
        Arc::new(SimulatedMeter::default()),
        ReadMode::Detailed,
        Duration::from_millis(10),
    );
    acquisition.start().await;
    assert!(wait_for(|| acquisition.get_data().is_some(), Duration::from_secs(2)).await);

    acquisition.stop().await;
    assert!(!acquisition.is_running().await);

    let reading = acquisition.get_data().unwrap();
    assert_eq!(reading.phases.as_ref().map(Vec::len), Some(3));

    let polls = acquisition.stats().polls_ok;
    sleep(Duration::from_millis(50)).await;
    assert_eq!(acquisition.stats().polls_ok, polls);
}

#[tokio::test]
async fn test_start_and_stop_are_idempotent() {
    let acquisition = AcquisitionLoop::new(
        Arc::new(SimulatedMeter::default()),
        ReadMode::Basic,
        Duration::from_millis(20),
    );

    acquisition.stop().await;
    acquisition.start().await;
    acquisition.start().await;
    assert!(acquisition.is_running().await);

    acquisition.stop().await;
    acquisition.stop().await;
    assert!(!acquisition.is_running().await);

    // restartable
    acquisition.start().await;
    assert!(acquisition.is_running().await);
    acquisition.stop().await;
}

#[tokio::test]
async fn test_stop_is_prompt_during_long_interval() {
    let acquisition = AcquisitionLoop::new(
        Arc::new(SimulatedMeter::default()),
        ReadMode::Basic,
        Duration::from_secs(3600),
    );
    acquisition.start().await;
    assert!(wait_for(|| acquisition.get_data().is_some(), Duration::from_secs(2)).await);

    let began = Instant::now();
    acquisition.stop().await;
    assert!(began.elapsed() < Duration::from_secs(1));
}

#[tokio::test]
async fn test_stop_leaves_the_device_idle() {
    let meter = Arc::new(SlowMeter::default());
    let acquisition = AcquisitionLoop::new(
        meter.clone(),
        ReadMode::Basic,
        Duration::from_millis(10),
    );
    acquisition.start().await;
    assert!(wait_for(|| meter.busy.load(Ordering::SeqCst), Duration::from_secs(2)).await);

    acquisition.stop().await;
    assert!(!acquisition.is_running().await);
    assert!(!meter.busy.load(Ordering::SeqCst));

    // no further reads once stopped
    let reads = meter.reads.load(Ordering::SeqCst);
    sleep(Duration::from_millis(50)).await;
    assert_eq!(meter.reads.load(Ordering::SeqCst), reads);
}

#[tokio::test]
async fn test_direct_reads_bypass_the_snapshot() {
    let meter = Arc::new(SimulatedMeter::default());
    meter.set_register(40010, 0xBEEF).unwrap();
    let acquisition = AcquisitionLoop::new(meter, ReadMode::Basic, Duration::from_secs(60));

    assert_eq!(acquisition.read_register(40010).await.unwrap(), 0xBEEF);
    assert_eq!(acquisition.read_register(9).await.unwrap(), 0xBEEF);
    assert_eq!(
        acquisition.read_registers(40009, 3).await.unwrap(),
        vec![0, 0xBEEF, 0]
    );
    assert!(acquisition.get_data().is_none());
}

#[tokio::test]
async fn test_direct_read_errors_pass_through() {
    let acquisition = AcquisitionLoop::new(
        Arc::new(FlakyMeter::new(0)),
        ReadMode::Basic,
        Duration::from_secs(60),
    );

    assert_eq!(
        acquisition.read_register(40001).await,
        Err(MeterError::InvalidRegister(40001))
    );
    assert_eq!(
        acquisition.read_registers(40001, 2).await,
        Err(MeterError::NoResponse)
    );
    assert_eq!(acquisition.send_raw_command(vec![1, 3]).await, Ok(Vec::new()));
}
