/// Per-run record counters, reported at the end of a run.
#[derive(Debug, Default, Eq, PartialEq)]
pub struct Stats {
    n_onchain_records: usize,
    n_lightning_records: usize,
    n_skipped_records: usize,
    n_outside_window: usize,
    n_transactions: usize,
}

impl Stats {
    pub fn inc_onchain_records(&mut self) {
        self.n_onchain_records += 1;
    }

    pub fn inc_lightning_records(&mut self) {
        self.n_lightning_records += 1;
    }

    pub fn inc_skipped_records(&mut self) {
        self.n_skipped_records += 1;
    }

    pub fn inc_outside_window(&mut self) {
        self.n_outside_window += 1;
    }

    pub fn inc_transactions(&mut self) {
        self.n_transactions += 1;
    }

    pub fn skipped_records(&self) -> usize {
        self.n_skipped_records
    }

    pub fn outside_window(&self) -> usize {
        self.n_outside_window
    }

    pub fn transactions(&self) -> usize {
        self.n_transactions
    }

    pub fn pretty_print(&self) {
        println!("{self:#?}");
        println!();
    }
}
