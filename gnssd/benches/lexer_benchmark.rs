use criterion::{criterion_group, criterion_main, Criterion};
use gnssd::{checksum::nmea_xor, Context, Lexer, Session};
use rand::RngExt;

/// How many packets of each protocol go into the synthetic capture.
const PACKETS: usize = 300;

fn ubx(class: u8, id: u8, payload: &[u8]) -> Vec<u8> {
    gnssd::ubx::frame(class, id, payload)
}

fn nmea(body: &str) -> Vec<u8> {
    format!("${body}*{:02X}\r\n", nmea_xor(body.as_bytes())).into_bytes()
}

/// A capture mixing NAV-PVT, GGA and TSIP LFwEI packets with random
/// payload bytes.
fn mixed_capture() -> Vec<u8> {
    let mut rng = rand::rng();
    let mut data = Vec::new();
    for i in 0..PACKETS {
        let mut pvt = vec![0u8; 92];
        for b in pvt.iter_mut() {
            *b = rng.random_range(0..=u8::MAX);
        }
        data.extend(ubx(0x01, 0x07, &pvt));

        let secs = i % 86_400;
        data.extend(nmea(&format!(
            "GPGGA,{:02}{:02}{:02}.00,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,",
            secs / 3600,
            secs / 60 % 60,
            secs % 60
        )));

        let mut lfwei = vec![0x8f, 0x20];
        for _ in 0..55 {
            lfwei.push(rng.random_range(0..=u8::MAX));
        }
        data.extend(gnssd::tsip::frame(&lfwei));
    }
    data
}

fn frame_all(data: &[u8], chunk_size: usize) -> usize {
    let mut lexer = Lexer::new();
    let mut count = 0;
    for mut chunk in data.chunks(chunk_size) {
        while !chunk.is_empty() {
            let n = lexer.feed(chunk);
            chunk = &chunk[n..];
            while lexer.parse() {
                if lexer.packet().is_some() {
                    count += 1;
                }
            }
        }
    }
    count
}

fn decode_all(data: &[u8], chunk_size: usize) -> u64 {
    let mut ctx = Context::new(1_717_200_000);
    ctx.readonly = true;
    let mut session = Session::default();
    for chunk in data.chunks(chunk_size) {
        session.feed_at(&mut ctx, chunk, 0.0);
    }
    session.lexer.char_counter
}

pub fn criterion_benchmark(c: &mut Criterion) {
    let data = mixed_capture();
    for chunk in &[99, 100, 101, 256, 512, 1000, 1024] {
        c.bench_function(&format!("lexer_mixed_{}", chunk), |b| {
            b.iter(|| {
                assert_eq!(frame_all(&data, *chunk), 3 * PACKETS);
            })
        });
    }
    for chunk in &[100, 1024] {
        c.bench_function(&format!("session_mixed_{}", chunk), |b| b.iter(|| decode_all(&data, *chunk)));
    }
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
