use assist_stream::streaming::{SseFrameParser, WireEvent, frames, tee};
use bytes::Bytes;
use futures::{StreamExt, stream};

const SAMPLE: &str = concat!(
    ": keep-alive\n",
    "event: message\r\n",
    "id: 01\r\n",
    "data: {\"content\":\"naïve café ☕ 日本\"}\r\n",
    "\r\n",
    "data: line one\n",
    "data: line two 🚀\n",
    "\n",
    "event: done\n",
    "data: {}\n",
    "\n",
    "data: after terminal\n\n",
);

fn parse_chunks(chunks: &[&[u8]]) -> Vec<WireEvent> {
    let mut parser = SseFrameParser::new();
    let mut events = Vec::new();
    for chunk in chunks {
        events.extend(parser.feed(chunk));
    }
    events.extend(parser.finish());
    events
}

#[test]
fn test_sample_parses_to_three_events() {
    let events = parse_chunks(&[SAMPLE.as_bytes()]);
    assert_eq!(events.len(), 3);
    assert_eq!(events[0].event.as_deref(), Some("message"));
    assert_eq!(events[0].id.as_deref(), Some("01"));
    assert_eq!(events[0].data, "{\"content\":\"naïve café ☕ 日本\"}");
    assert_eq!(events[1].data, "line one\nline two 🚀");
    assert!(events[2].is_terminal());
}

#[test]
fn test_every_two_way_split_matches_contiguous() {
    let bytes = SAMPLE.as_bytes();
    let expected = parse_chunks(&[bytes]);

    for i in 0..=bytes.len() {
        let (a, b) = bytes.split_at(i);
        assert_eq!(parse_chunks(&[a, b]), expected, "split at {}", i);
    }
}

#[test]
fn test_three_way_splits_match_contiguous() {
    let bytes = SAMPLE.as_bytes();
    let expected = parse_chunks(&[bytes]);

    for i in (0..bytes.len()).step_by(3) {
        for j in (i..=bytes.len()).step_by(5) {
            let parts = [&bytes[..i], &bytes[i..j], &bytes[j..]];
            assert_eq!(parse_chunks(&parts), expected, "split at {} and {}", i, j);
        }
    }
}

#[test]
fn test_byte_at_a_time() {
    let bytes = SAMPLE.as_bytes();
    let singles: Vec<&[u8]> = bytes.chunks(1).collect();
    assert_eq!(parse_chunks(&singles), parse_chunks(&[bytes]));
}

#[tokio::test]
async fn test_frames_over_tee_branches_agree() {
    let chunks: Vec<assist_stream::Result<Bytes>> = SAMPLE
        .as_bytes()
        .chunks(4)
        .map(|c| Ok(Bytes::copy_from_slice(c)))
        .collect();

    let (left, right) = tee(stream::iter(chunks), 64);
    let (left, right) = tokio::join!(
        frames(left).collect::<Vec<_>>(),
        frames(right).collect::<Vec<_>>()
    );

    let left: Vec<WireEvent> = left.into_iter().map(|e| e.unwrap()).collect();
    let right: Vec<WireEvent> = right.into_iter().map(|e| e.unwrap()).collect();
    assert_eq!(left, right);
    assert_eq!(left, parse_chunks(&[SAMPLE.as_bytes()]));
}
