use criterion::{Criterion, black_box, criterion_group, criterion_main};
use waveio_core::RingBuffer;

fn write_read_roundtrip(c: &mut Criterion) {
    let rb = RingBuffer::new(1 << 20).unwrap();
    let chunk = vec![0x5au8; 4096];
    let mut out = vec![0u8; 4096];

    c.bench_function("ring_buffer_write_read_4k", |b| {
        b.iter(|| {
            let ptr = rb.write_ptr();
            // SAFETY: chunk.len() is far smaller than capacity, so free_count
            // never blocks this benchmark from having room.
            unsafe { std::ptr::copy_nonoverlapping(chunk.as_ptr(), ptr, chunk.len()) };
            rb.advance_write_ptr(chunk.len());

            let ptr = rb.read_ptr();
            // SAFETY: we just wrote chunk.len() bytes above.
            unsafe { std::ptr::copy_nonoverlapping(ptr, out.as_mut_ptr(), out.len()) };
            rb.advance_read_ptr(out.len());

            black_box(&out);
        });
    });
}

fn fill_and_free_count(c: &mut Criterion) {
    let rb = RingBuffer::new(1 << 20).unwrap();
    rb.advance_write_ptr(1024);

    c.bench_function("ring_buffer_fill_count", |b| {
        b.iter(|| black_box(rb.fill_count()));
    });
    c.bench_function("ring_buffer_free_count", |b| {
        b.iter(|| black_box(rb.free_count()));
    });
}

criterion_group!(benches, write_read_roundtrip, fill_and_free_count);
criterion_main!(benches);
