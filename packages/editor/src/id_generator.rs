use crc32fast::Hasher;

/// Seed for ids minted in one session, derived from the session name
pub fn session_seed(name: &str) -> String {
    let mut hasher = Hasher::new();
    hasher.update(name.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Sequential id generator for new visual nodes
#[derive(Debug, Clone)]
pub struct IdGenerator {
    seed: String,
    count: u32,
}

impl IdGenerator {
    pub fn new(session_name: &str) -> Self {
        Self {
            seed: session_seed(session_name),
            count: 0,
        }
    }

    /// Next id for which `taken` is false
    ///
    /// Live and retired ids are both passed through `taken`, so a deleted
    /// node's id is never handed out again.
    pub fn next_id(&mut self, taken: impl Fn(&str) -> bool) -> String {
        loop {
            self.count += 1;
            let id = format!("{}-{}", self.seed, self.count);
            if !taken(&id) {
                return id;
            }
        }
    }

    pub fn seed(&self) -> &str {
        &self.seed
    }
}
