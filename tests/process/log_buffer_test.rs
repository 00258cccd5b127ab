/*!
 * Log Buffer Tests
 * Retention properties of the per-process ring buffer
 */

use devfleet::process::{LogBuffer, LogStream};
use proptest::prelude::*;
use std::sync::Arc;
use std::thread;

proptest! {
    #[test]
    fn retains_exactly_the_newest_lines(capacity in 1usize..64, extra in 0usize..200) {
        let buffer = LogBuffer::new(capacity);
        let total = capacity + extra;
        for i in 0..total {
            buffer.push_line(LogStream::Stdout, i.to_string());
        }

        let kept: Vec<String> = buffer.read_all().into_iter().map(|l| l.text).collect();
        let expected: Vec<String> = (extra..total).map(|i| i.to_string()).collect();
        prop_assert_eq!(kept, expected);
        prop_assert_eq!(buffer.total_written(), total as u64);
    }

    #[test]
    fn tail_is_suffix_of_read_all(capacity in 1usize..32, pushed in 0usize..64, n in 0usize..40) {
        let buffer = LogBuffer::new(capacity);
        for i in 0..pushed {
            buffer.push_line(LogStream::Stderr, i.to_string());
        }

        let all = buffer.read_all();
        let tail = buffer.tail(n);
        prop_assert_eq!(tail.len(), n.min(all.len()));
        prop_assert_eq!(&all[all.len() - tail.len()..], &tail[..]);
    }
}

#[test]
fn test_concurrent_writers_preserve_per_stream_order() {
    let buffer = Arc::new(LogBuffer::new(10_000));
    let handles: Vec<_> = [LogStream::Stdout, LogStream::Stderr]
        .into_iter()
        .map(|stream| {
            let buffer = Arc::clone(&buffer);
            thread::spawn(move || {
                for i in 0..1_000 {
                    buffer.push_line(stream, i.to_string());
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let lines = buffer.read_all();
    assert_eq!(lines.len(), 2_000);
    for stream in [LogStream::Stdout, LogStream::Stderr] {
        let seq: Vec<usize> = lines
            .iter()
            .filter(|l| l.stream == stream)
            .map(|l| l.text.parse().unwrap())
            .collect();
        assert_eq!(seq, (0..1_000).collect::<Vec<_>>());
    }
}
