use super::boards::{bladerf1, bladerf2, Bladerf1, Bladerf2};
use super::devinfo::UsbIds;
use super::traits::Board;

type BoardFactory = Box<dyn Fn() -> Box<dyn Board> + Send + Sync>;

struct BoardEntry {
    name: &'static str,
    ids: Vec<UsbIds>,
    factory: BoardFactory,
}

/// Board implementations in probe order
pub struct BoardRegistry {
    boards: Vec<BoardEntry>,
}

impl BoardRegistry {
    pub fn new() -> Self {
        Self { boards: Vec::new() }
    }

    /// Registry holding every built-in board
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(bladerf1::NAME, bladerf1::USB_IDS, || Box::new(Bladerf1::new()));
        registry.register(bladerf2::NAME, bladerf2::USB_IDS, || Box::new(Bladerf2::new()));
        registry
    }

    pub fn register<F>(&mut self, name: &'static str, ids: &[UsbIds], factory: F)
    where
        F: Fn() -> Box<dyn Board> + Send + Sync + 'static,
    {
        self.boards.push(BoardEntry {
            name,
            ids: ids.to_vec(),
            factory: Box::new(factory),
        });
    }

    /// First registered board claiming `ids`
    pub fn find(&self, ids: UsbIds) -> Option<Box<dyn Board>> {
        self.boards
            .iter()
            .find(|entry| entry.ids.contains(&ids))
            .map(|entry| (entry.factory)())
    }

    pub fn list_boards(&self) -> Vec<&'static str> {
        self.boards.iter().map(|entry| entry.name).collect()
    }
}

impl Default for BoardRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
