use criterion::{criterion_group, criterion_main, Criterion};
use peerview::signaling::{SignalMessage, SignalParser, SERVER_PEER_ID};

fn sample_offer_json() -> String {
    let mut sdp = String::from(
        "v=0\r\no=- 4611731400430051336 2 IN IP4 127.0.0.1\r\ns=-\r\nt=0 0\r\n\
         a=group:BUNDLE 0\r\nm=video 9 UDP/TLS/RTP/SAVPF 96\r\nc=IN IP4 0.0.0.0\r\n\
         a=rtpmap:96 H264/90000\r\na=fmtp:96 packetization-mode=1\r\n",
    );
    for i in 0..24 {
        sdp.push_str(&format!(
            "a=candidate:{} 1 udp 2122252543 192.0.2.{} 49152 typ host\r\n",
            i,
            i + 1
        ));
    }

    serde_json::to_string(&serde_json::json!({
        "type": "offer",
        "id": "server",
        "sdp": sdp,
    }))
    .expect("offer json")
}

fn bench_parse_offer(c: &mut Criterion) {
    let json = sample_offer_json();

    c.bench_function("parse_offer", |b| {
        b.iter(|| {
            let _ = SignalParser::parse(&json).expect("parse offer");
        })
    });
}

fn bench_serialize_candidate(c: &mut Criterion) {
    let msg = SignalMessage::candidate(
        "candidate:0 1 udp 2122252543 192.0.2.7 49152 typ host".to_string(),
        Some("0".to_string()),
        Some(0),
        SERVER_PEER_ID,
    );

    c.bench_function("serialize_candidate", |b| {
        b.iter(|| {
            let _ = msg.to_json().expect("serialize candidate");
        })
    });
}

criterion_group!(benches, bench_parse_offer, bench_serialize_candidate);
criterion_main!(benches);
