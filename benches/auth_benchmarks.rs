use std::hint::black_box;

use criterion::{criterion_group, criterion_main, Criterion};
use powermeter::auth::{generate_token, AuthenticationManager, PasswordHasher, Permission};
use powermeter::config::AuthConfig;
use powermeter::meter::frame::{crc16, parse_response, read_request};
use powermeter::meter::{MeterClient, SimulatedMeter};

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

fn bench_password_hashing(c: &mut Criterion) {
    let hasher = PasswordHasher::new("powermeter_salt_2024");
    let hash = hasher.hash("operator");

    c.bench_function("password_hash", |b| {
        b.iter(|| hasher.hash(black_box("operator")))
    });

    c.bench_function("password_verify", |b| {
        b.iter(|| hasher.verify(black_box("operator"), black_box(&hash)))
    });

    c.bench_function("generate_token", |b| b.iter(generate_token));
}

fn bench_session_validation(c: &mut Criterion) {
    let rt = runtime();
    let auth = AuthenticationManager::from_config(&AuthConfig::default());

    // a populated registry so lookups are not trivially small
    let token = rt.block_on(async {
        for _ in 0..1000 {
            auth.authenticate("viewer", "viewer").await.unwrap();
        }
        auth.authenticate("operator", "operator").await.unwrap().token
    });

    c.bench_function("validate_session", |b| {
        b.iter(|| rt.block_on(auth.validate_session(black_box(&token))))
    });

    c.bench_function("check_permission", |b| {
        b.iter(|| rt.block_on(auth.check_permission(black_box(&token), Permission::WRITE)))
    });

    c.bench_function("validate_unknown_token", |b| {
        b.iter(|| rt.block_on(auth.validate_session(black_box("missing"))))
    });

    c.bench_function("active_sessions_1000", |b| {
        b.iter(|| rt.block_on(auth.active_sessions()))
    });
}

fn bench_frames(c: &mut Criterion) {
    let meter = SimulatedMeter::default();
    let request = read_request(1, 3, 4000, 125);
    let response = meter.send_raw_command(&request).unwrap();

    c.bench_function("crc16_125_registers", |b| {
        b.iter(|| crc16(black_box(&response)))
    });

    c.bench_function("parse_response_125_registers", |b| {
        b.iter(|| parse_response(black_box(&request), black_box(&response)))
    });
}

criterion_group!(
    benches,
    bench_password_hashing,
    bench_session_validation,
    bench_frames
);
criterion_main!(benches);
