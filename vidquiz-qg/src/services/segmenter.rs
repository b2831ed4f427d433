//! Transcript segmenter
//!
//! Splits a transcript into fixed time windows and hands each window an equal share of
//! the transcript's words, in order. Word allocation is proportional to segment index,
//! not to speech timing; existing question sets depend on these exact boundaries, so
//! keep the allocation as it is.

use crate::models::SegmentDescriptor;
use thiserror::Error;

/// Default window length in seconds
pub const DEFAULT_WINDOW_SECS: f64 = 300.0;

/// Upper bound on windows per transcript (about 35 days at the default window)
pub const MAX_SEGMENTS: usize = 10_000;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SegmentError {
    #[error("video duration must be a positive number of seconds, got {0}")]
    InvalidDuration(f64),

    #[error("segment window must be a positive number of seconds, got {0}")]
    InvalidWindow(f64),

    #[error("duration {duration}s needs more than {max} windows of {window}s")]
    TooManySegments { duration: f64, window: f64, max: usize },
}

/// Partition `transcript` into `ceil(duration / window)` segments covering `[0, duration)`.
///
/// Pure and deterministic: the same input always yields the same descriptors.
pub fn segment_transcript(
    transcript: &str,
    duration: f64,
    window: f64,
) -> Result<Vec<SegmentDescriptor>, SegmentError> {
    if !(duration.is_finite() && duration > 0.0) {
        return Err(SegmentError::InvalidDuration(duration));
    }
    if !(window.is_finite() && window > 0.0) {
        return Err(SegmentError::InvalidWindow(window));
    }
    if (duration / window).ceil() > MAX_SEGMENTS as f64 {
        return Err(SegmentError::TooManySegments {
            duration,
            window,
            max: MAX_SEGMENTS,
        });
    }

    let segment_count = segment_count(duration, window);
    let words: Vec<&str> = transcript.split_whitespace().collect();
    let words_per_segment = words.len().div_ceil(segment_count);

    let segments = (0..segment_count)
        .map(|i| {
            let start_time = i as f64 * window;
            let end_time = ((i + 1) as f64 * window).min(duration);

            let first = (i * words_per_segment).min(words.len());
            let last = ((i + 1) * words_per_segment).min(words.len());
            let mut text = words[first..last].join(" ");
            if text.is_empty() {
                text = format!("Segment {} of {}", i + 1, segment_count);
            }

            SegmentDescriptor {
                index: i as u32,
                start_time,
                end_time,
                text,
            }
        })
        .collect();

    Ok(segments)
}

fn segment_count(duration: f64, window: f64) -> usize {
    let mut count = (duration / window).ceil().max(1.0) as usize;
    // Float division can round up past an exact multiple; never emit an empty tail window.
    while count > 1 && (count - 1) as f64 * window >= duration {
        count -= 1;
    }
    count
}
