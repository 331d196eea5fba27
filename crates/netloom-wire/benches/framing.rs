#[macro_use]
extern crate criterion;

use criterion::black_box;
use criterion::Criterion;
use netloom_wire::Message;

fn build_and_encode(c: &mut Criterion) {
    let payload = vec![0xABu8; 1024];

    c.bench_function("build small message", move |b| {
        b.iter(|| {
            let msg = Message::build(black_box(7), black_box(payload.clone())).unwrap();
            black_box(msg.to_bytes())
        })
    });
}

fn assemble_from_stream(c: &mut Criterion) {
    let wire = Message::build(7, vec![0xABu8; 1024]).unwrap().to_bytes();

    c.bench_function("assemble message byte by byte", move |b| {
        b.iter(|| {
            let mut msg = Message::new();
            for byte in &wire {
                let (_, complete) = msg.add_data(black_box(std::slice::from_ref(byte)));
                if complete {
                    break;
                }
            }
            black_box(msg.is_valid())
        })
    });
}

criterion_group!(benches, build_and_encode, assemble_from_stream);
criterion_main!(benches);
