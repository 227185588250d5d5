#[macro_use]
extern crate criterion;

use criterion::black_box;
use criterion::Criterion;
use lrpc_reactor::Buffer;

fn append_retrieve(c: &mut Criterion) {
    let payload = vec![0xABu8; 4096];

    c.bench_function("append small", move |b| {
        b.iter_with_setup(Buffer::new, |mut buf| {
            buf.append(b"ping");
            black_box(buf);
        })
    });

    c.bench_function("append grows buffer", move |b| {
        b.iter_with_setup(
            || Buffer::with_capacity(64),
            |mut buf| {
                buf.append(&payload);
                black_box(buf);
            },
        )
    });

    c.bench_function("append then retrieve_all", move |b| {
        let payload = vec![0xCDu8; 1024];
        b.iter_with_setup(Buffer::new, |mut buf| {
            buf.append(&payload);
            black_box(buf.retrieve_all_as_bytes());
        })
    });
}

criterion_group!(benches, append_retrieve);
criterion_main!(benches);
