use crate::error::{Error, Result};

/// Allocates link-scoped circuit ids for one client.
///
/// Relays never forget a circuit, so an id handed out once is never handed
/// out again; a rebuilt circuit gets ids no relay has seen from this client.
pub struct UIDGenerator {
    next: u32,
}

impl UIDGenerator {
    // Returns a new UIDGenerator whose first identifier is `first`
    pub fn new(first: u32) -> Self {
        Self { next: first }
    }

    // Returns a new unique identifier
    pub fn get_uid(&mut self) -> Result<u32> {
        let uid = self.next;
        self.next = uid
            .checked_add(1)
            .ok_or_else(|| Error::protocol("circuit id space exhausted"))?;
        Ok(uid)
    }

    // Returns `n` consecutive unique identifiers
    pub fn get_uids(&mut self, n: usize) -> Result<Vec<u32>> {
        (0..n).map(|_| self.get_uid()).collect()
    }
}
