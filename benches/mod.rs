use criterion::{criterion_group, criterion_main};


criterion_group!(
    benches,
    mqtt::bench_topic_matching,
    mqtt::bench_publish_qos0,
    mqtt::bench_publish_and_poll_qos0,
    rotation::bench_encode_request,
    rotation::bench_decode_response,
    rotation::bench_fingerprint
);
criterion_main!(benches);
