use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;

// ASCII-ordered so byte order of keys matches creation order.
const PUSH_CHARS: &[u8; 64] = b"-0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ_abcdefghijklmnopqrstuvwxyz";

#[derive(Debug, Default)]
struct PushState {
    last_ms: u64,
    last_rand: [u8; 12],
}

/// Generates 20-character child keys: 8 characters of millisecond timestamp
/// followed by 12 random characters. Keys generated within the same
/// millisecond increment the random part, so keys from one generator sort in
/// generation order.
#[derive(Debug, Default)]
pub struct PushKeyGenerator {
    state: Mutex<PushState>,
}

impl PushKeyGenerator {
    pub fn new() -> Self { Self::default() }

    pub fn next_key(&self) -> String {
        let now_ms = SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as u64).unwrap_or(0);
        self.next_key_at(now_ms)
    }

    pub(crate) fn next_key_at(&self, now_ms: u64) -> String {
        let mut st = self.state.lock();
        // clock going backwards must not reorder keys
        let ms = now_ms.max(st.last_ms);
        if ms == st.last_ms && st.last_ms != 0 {
            increment(&mut st.last_rand);
        } else {
            let mut buf = [0u8; 12];
            if getrandom::getrandom(&mut buf).is_err() {
                // counter-only fallback still yields unique, ordered keys
                buf = [0u8; 12];
            }
            for b in buf.iter_mut() { *b &= 63; }
            st.last_rand = buf;
            st.last_ms = ms;
        }

        let mut out = [0u8; 20];
        let mut t = ms;
        for i in (0..8).rev() {
            out[i] = PUSH_CHARS[(t % 64) as usize];
            t /= 64;
        }
        for (i, r) in st.last_rand.iter().enumerate() {
            out[8 + i] = PUSH_CHARS[*r as usize];
        }
        out.iter().map(|b| *b as char).collect()
    }
}

fn increment(digits: &mut [u8; 12]) {
    for d in digits.iter_mut().rev() {
        if *d == 63 {
            *d = 0;
        } else {
            *d += 1;
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_twenty_chars_from_alphabet() {
        let g = PushKeyGenerator::new();
        let k = g.next_key();
        assert_eq!(k.len(), 20);
        assert!(k.bytes().all(|b| PUSH_CHARS.contains(&b)));
    }

    #[test]
    fn keys_in_same_millisecond_sort_in_generation_order() {
        let g = PushKeyGenerator::new();
        let keys: Vec<String> = (0..200).map(|_| g.next_key_at(1_700_000_000_000)).collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
        let unique: std::collections::HashSet<_> = keys.iter().collect();
        assert_eq!(unique.len(), keys.len());
    }

    #[test]
    fn later_milliseconds_sort_after_earlier_ones() {
        let g = PushKeyGenerator::new();
        let a = g.next_key_at(1_000);
        let b = g.next_key_at(2_000);
        let c = g.next_key_at(1_500); // clock skew backwards
        assert!(a < b);
        assert!(b < c);
    }
}
