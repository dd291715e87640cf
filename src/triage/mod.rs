//! # Triage Classifier Module
//!
//! On-device classification of typed emergency messages. A text is
//! normalized, mapped to an 82-float feature vector and pushed through three
//! compiled decision trees: a vital gate, an intent classifier and an
//! urgency classifier. Vital messages additionally get flags, a casualty
//! count and a location token extracted, and are compacted into the
//! `INTENT|U<u>|F<f>|N<n>|L<loc>` wire payload carried in DATA bodies.
//!
//! ## Feature Vector
//!
//! - 0..7: structural features (word/char/digit counts, punctuation, caps
//!   ratio, time-word and location-word presence)
//! - 8..17: keyword bucket hit counts, one bucket per intent class
//! - 18..81: FNV1a-hashed character 4-gram bins over the space-padded
//!   normalized text, clamped to 15 and scaled to [0, 1]
//!
//! Classification is total: malformed or empty input yields a non-vital
//! CHAT result, and out-of-range tree outputs fall back to INFO / urgency 2.

mod lexicon;
mod trees;

use core::fmt::Write;

use lexicon::{BUCKETS, LOCATION_CUES, LOCATION_WORDS, PLACE_TOKENS, TIME_WORDS};

/// Feature vector width.
pub const FEATURE_DIM: usize = 82;

const STRUCTURE_DIM: usize = 8;
const NGRAM_BINS: usize = 64;
const NGRAM_START: usize = STRUCTURE_DIM + BUCKETS.len();

/// Classifier input is truncated to this many bytes.
pub const MAX_TEXT_LEN: usize = 160;

/// Upper bound for DATA bodies produced from classifier output.
pub const MAX_PAYLOAD_LEN: usize = 48;

/// Message intent classes, in classifier output order.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Intent {
    Medic,
    Water,
    Food,
    Shelter,
    Danger,
    Evac,
    Info,
    Disaster,
    Sickness,
    Chat,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::Medic => "MEDIC",
            Intent::Water => "WATER",
            Intent::Food => "FOOD",
            Intent::Shelter => "SHELTER",
            Intent::Danger => "DANGER",
            Intent::Evac => "EVAC",
            Intent::Info => "INFO",
            Intent::Disaster => "DISASTER",
            Intent::Sickness => "SICKNESS",
            Intent::Chat => "CHAT",
        }
    }

    fn from_class(class: i8) -> Option<Intent> {
        match class {
            0 => Some(Intent::Medic),
            1 => Some(Intent::Water),
            2 => Some(Intent::Food),
            3 => Some(Intent::Shelter),
            4 => Some(Intent::Danger),
            5 => Some(Intent::Evac),
            6 => Some(Intent::Info),
            7 => Some(Intent::Disaster),
            8 => Some(Intent::Sickness),
            9 => Some(Intent::Chat),
            _ => None,
        }
    }

    pub fn from_label(label: &str) -> Option<Intent> {
        match label {
            "MEDIC" => Some(Intent::Medic),
            "WATER" => Some(Intent::Water),
            "FOOD" => Some(Intent::Food),
            "SHELTER" => Some(Intent::Shelter),
            "DANGER" => Some(Intent::Danger),
            "EVAC" => Some(Intent::Evac),
            "INFO" => Some(Intent::Info),
            "DISASTER" => Some(Intent::Disaster),
            "SICKNESS" => Some(Intent::Sickness),
            "CHAT" => Some(Intent::Chat),
            _ => None,
        }
    }

    /// bit1 of the flags byte: intents that should be confirmed by a human.
    fn needs_confirmation(&self) -> bool {
        matches!(self, Intent::Danger | Intent::Evac | Intent::Disaster)
    }
}

/// Result of classifying one message.
#[derive(Clone)]
#[cfg_attr(feature = "std", derive(Debug))]
pub struct TriageOutput {
    pub is_vital: bool,
    pub intent: Intent,
    /// 0 (routine) .. 3 (critical)
    pub urgency: u8,
    /// bit0 = needs-location, bit1 = needs-confirmation
    pub flags: u8,
    /// First 1-2 digit run in the text, 0 if absent
    pub count: u8,
    /// Recognized place token, or "unknown"
    pub location: &'static str,
    /// DATA body to transmit: compact payload for vital messages, the raw
    /// text truncated to `MAX_PAYLOAD_LEN` otherwise
    pub wire_payload: heapless::String<MAX_PAYLOAD_LEN>,
}

fn truncate_utf8(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

fn truncated_string<const N: usize>(text: &str) -> heapless::String<N> {
    let mut out = heapless::String::new();
    let _ = out.push_str(truncate_utf8(text, N));
    out
}

/// Lowercases ASCII alphanumerics and collapses every run of anything else
/// into a single space, trimming the ends.
fn normalize(raw: &str, out: &mut heapless::String<MAX_TEXT_LEN>) {
    let mut prev_space = true;
    for &byte in raw.as_bytes() {
        if byte.is_ascii_alphanumeric() {
            let _ = out.push(byte.to_ascii_lowercase() as char);
            prev_space = false;
        } else if !prev_space {
            let _ = out.push(' ');
            prev_space = true;
        }
    }
    if out.ends_with(' ') {
        out.pop();
    }
}

fn fnv1a32(bytes: &[u8]) -> u32 {
    let mut hash: u32 = 0x811C_9DC5;
    for &byte in bytes {
        hash ^= byte as u32;
        hash = hash.wrapping_mul(0x0100_0193);
    }
    hash
}

fn contains_token(norm: &str, token: &str) -> bool {
    norm.split(' ').any(|word| word == token)
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|needle| haystack.contains(needle))
}

fn build_vector(raw: &str, norm: &str, x: &mut [f32; FEATURE_DIM]) {
    let word_count = norm.split(' ').filter(|word| !word.is_empty()).count();
    let char_count = norm.len();

    let mut digit_count = 0usize;
    let mut letters = 0usize;
    let mut caps = 0usize;
    let mut has_excl = false;
    let mut has_q = false;
    for &byte in raw.as_bytes() {
        if byte.is_ascii_digit() {
            digit_count += 1;
        }
        if byte == b'!' {
            has_excl = true;
        }
        if byte == b'?' {
            has_q = true;
        }
        if byte.is_ascii_alphabetic() {
            letters += 1;
            if byte.is_ascii_uppercase() {
                caps += 1;
            }
        }
    }
    let caps_ratio = if letters > 0 { caps as f32 / letters as f32 } else { 0.0 };

    let has_time = TIME_WORDS.iter().any(|word| contains_token(norm, word));
    let has_loc = contains_any(norm, LOCATION_WORDS);

    x[0] = word_count.min(50) as f32 / 50.0;
    x[1] = char_count.min(200) as f32 / 200.0;
    x[2] = digit_count.min(20) as f32 / 20.0;
    x[3] = if has_excl { 1.0 } else { 0.0 };
    x[4] = if has_q { 1.0 } else { 0.0 };
    x[5] = (caps_ratio * 10.0).min(1.0);
    x[6] = if has_time { 1.0 } else { 0.0 };
    x[7] = if has_loc { 1.0 } else { 0.0 };

    for (bucket_index, bucket) in BUCKETS.iter().enumerate() {
        let hits = bucket.iter().filter(|phrase| norm.contains(*phrase)).count();
        x[STRUCTURE_DIM + bucket_index] = hits as f32;
    }

    // Character 4-grams over the space-padded normalized text.
    let mut padded = [b' '; MAX_TEXT_LEN + 2];
    padded[1..1 + norm.len()].copy_from_slice(norm.as_bytes());
    let padded_len = norm.len() + 2;
    if padded_len >= 4 {
        for i in 0..=padded_len - 4 {
            let gram = &padded[i..i + 4];
            if gram.iter().all(|&byte| byte == b' ') {
                continue;
            }
            let bin = (fnv1a32(gram) % NGRAM_BINS as u32) as usize;
            x[NGRAM_START + bin] += 1.0;
        }
    }
    for value in x[NGRAM_START..].iter_mut() {
        if *value > 15.0 {
            *value = 15.0;
        }
        *value /= 15.0;
    }
}

/// Builds the feature vector for `text`. Exposed for property tests.
pub fn feature_vector(text: &str) -> [f32; FEATURE_DIM] {
    let raw = truncate_utf8(text, MAX_TEXT_LEN);
    let mut norm = heapless::String::new();
    normalize(raw, &mut norm);
    let mut x = [0.0f32; FEATURE_DIM];
    build_vector(raw, &norm, &mut x);
    x
}

fn extract_count(norm: &str) -> u8 {
    let bytes = norm.as_bytes();
    for (i, &byte) in bytes.iter().enumerate() {
        if byte.is_ascii_digit() {
            let mut value = (byte - b'0') as u16;
            if let Some(&next) = bytes.get(i + 1) {
                if next.is_ascii_digit() {
                    value = value * 10 + (next - b'0') as u16;
                }
            }
            return value.min(255) as u8;
        }
    }
    0
}

fn extract_location(norm: &str) -> &'static str {
    PLACE_TOKENS.iter().find(|place| norm.contains(*place)).copied().unwrap_or("unknown")
}

/// Classifies one message. Never fails; non-vital input degrades to CHAT
/// with the raw text as payload.
pub fn run_triage(text: &str) -> TriageOutput {
    let raw = truncate_utf8(text, MAX_TEXT_LEN);
    let mut norm = heapless::String::new();
    normalize(raw, &mut norm);
    let mut x = [0.0f32; FEATURE_DIM];
    build_vector(raw, &norm, &mut x);

    if trees::vital_predict(&x) != 1 {
        return TriageOutput {
            is_vital: false,
            intent: Intent::Chat,
            urgency: 0,
            flags: 0,
            count: 0,
            location: "unknown",
            wire_payload: truncated_string(raw),
        };
    }

    let intent = Intent::from_class(trees::intent_predict(&x)).unwrap_or(Intent::Info);
    let urgency = match trees::urgency_predict(&x) {
        class if class < 0 => 2,
        class => (class as u8).min(3),
    };

    let needs_location = !contains_any(&norm, LOCATION_CUES);
    let flags = (needs_location as u8) | ((intent.needs_confirmation() as u8) << 1);
    let count = extract_count(&norm);
    let location = extract_location(&norm);

    let mut wire_payload = heapless::String::new();
    let _ = write!(wire_payload, "{}|U{}|F{}|N{}|L{}", intent.as_str(), urgency, flags, count, location);

    TriageOutput {
        is_vital: true,
        intent,
        urgency,
        flags,
        count,
        location,
        wire_payload,
    }
}

/// Reconstructs triage metadata from a received DATA body.
///
/// Vital payloads are recognized by the `|U` marker; everything else is
/// carried as plain chat text. Only intent and urgency are recoverable.
pub fn decode_payload(body: &str) -> TriageOutput {
    let mut out = TriageOutput {
        is_vital: false,
        intent: Intent::Chat,
        urgency: 0,
        flags: 0,
        count: 0,
        location: "unknown",
        wire_payload: truncated_string(body),
    };

    let Some(marker) = body.find("|U") else {
        return out;
    };

    out.is_vital = true;
    out.intent = match body.split('|').next() {
        Some(label) => Intent::from_label(label).unwrap_or(Intent::Info),
        None => Intent::Info,
    };
    let digits: u32 = body[marker + 2..]
        .bytes()
        .take_while(|byte| byte.is_ascii_digit())
        .fold(0u32, |acc, byte| acc.saturating_mul(10).saturating_add((byte - b'0') as u32));
    out.urgency = digits.min(3) as u8;
    out
}
