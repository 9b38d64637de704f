//! Request-scoped page-weight budget.
//!
//! One `Budget` is built per client request and threaded through every
//! producer (transcoder, image processor). Producers check and decrement;
//! exhaustion truncates output gracefully instead of failing the page.
//! Counters are atomic because images of one page transcode concurrently.

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::time::Instant;

pub struct Budget {
    page_cap: usize,
    bytes_remaining: AtomicUsize,
    images_remaining: AtomicU32,
    deadline: Instant,
}

impl Budget {
    pub fn new(max_bytes: usize, max_images: u32, deadline: Instant) -> Self {
        Self {
            page_cap: max_bytes,
            bytes_remaining: AtomicUsize::new(max_bytes),
            images_remaining: AtomicU32::new(max_images),
            deadline,
        }
    }

    /// The absolute serialized-page cap this budget started from.
    pub fn page_cap(&self) -> usize {
        self.page_cap
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn expired(&self) -> bool {
        Instant::now() >= self.deadline
    }

    pub fn bytes_remaining(&self) -> usize {
        self.bytes_remaining.load(Ordering::Relaxed)
    }

    /// Reserve `n` output bytes; false when the page weight is spent.
    pub fn try_charge_bytes(&self, n: usize) -> bool {
        self.bytes_remaining
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |cur| {
                cur.checked_sub(n)
            })
            .is_ok()
    }

    /// Reserve an image slot plus its encoded byte cost.
    ///
    /// The slot is refunded when the byte charge fails, so a too-big
    /// image does not consume the page's image allowance.
    pub fn try_charge_image(&self, encoded_bytes: usize) -> bool {
        let slot = self
            .images_remaining
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |cur| {
                cur.checked_sub(1)
            })
            .is_ok();
        if !slot {
            return false;
        }
        if !self.try_charge_bytes(encoded_bytes) {
            self.images_remaining.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn budget(bytes: usize, images: u32) -> Budget {
        Budget::new(bytes, images, Instant::now() + Duration::from_secs(30))
    }

    #[test]
    fn byte_charges_stop_at_zero() {
        let b = budget(10, 5);
        assert!(b.try_charge_bytes(6));
        assert!(!b.try_charge_bytes(6));
        assert!(b.try_charge_bytes(4));
        assert_eq!(b.bytes_remaining(), 0);
    }

    #[test]
    fn image_slot_refunded_on_byte_overflow() {
        let b = budget(5, 1);
        assert!(!b.try_charge_image(100));
        // The slot survived the failed byte charge.
        assert!(b.try_charge_image(5));
    }

    #[test]
    fn image_slots_are_bounded() {
        let b = budget(1000, 2);
        assert!(b.try_charge_image(1));
        assert!(b.try_charge_image(1));
        assert!(!b.try_charge_image(1));
    }
}
