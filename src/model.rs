use serde::{Deserialize, Serialize};

/// Densities of every state variable over the whole simulation.
///
/// Rows are state variables (row 0 uninfected hosts, row `i + 1` strain slot `i`),
/// columns are time samples `t0 + col * stride`. Storage is column-major so
/// that one time sample is a contiguous slice.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct PopulationMatrix {
    n_rows: usize,
    n_cols: usize,
    t0: f64,
    stride: f64,
    data: Vec<f64>,
}

impl PopulationMatrix {
    /// Create a zero-filled matrix.
    pub fn zeros(n_rows: usize, n_cols: usize, t0: f64, stride: f64) -> Self {
        Self {
            n_rows,
            n_cols,
            t0,
            stride,
            data: vec![0.0; n_rows * n_cols],
        }
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn n_cols(&self) -> usize {
        self.n_cols
    }

    /// Number of strain slots (all rows but the host row).
    pub fn n_slots(&self) -> usize {
        self.n_rows - 1
    }

    /// Time coordinate of a column.
    pub fn time(&self, col: usize) -> f64 {
        self.t0 + col as f64 * self.stride
    }

    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.data[col * self.n_rows + row]
    }

    pub fn column(&self, col: usize) -> &[f64] {
        &self.data[col * self.n_rows..(col + 1) * self.n_rows]
    }

    /// Strain block of a column.
    pub fn strains(&self, col: usize) -> &[f64] {
        &self.column(col)[1..]
    }

    pub fn columns(&self) -> impl Iterator<Item = &[f64]> {
        self.data.chunks_exact(self.n_rows)
    }

    pub fn row(&self, row: usize) -> impl Iterator<Item = f64> + '_ {
        self.columns().map(move |column| column[row])
    }

    pub(crate) fn set_column(&mut self, col: usize, state: &[f64]) {
        debug_assert_eq!(state.len(), self.n_rows);
        self.data[col * self.n_rows..(col + 1) * self.n_rows].copy_from_slice(state);
    }
}

/// Lifecycle of a strain slot.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
pub enum Slot {
    /// Never occupied.
    Vacant,
    /// Holds a living strain, identified by its introduction order.
    Occupied { strain: usize },
    /// Its last occupant went extinct; the slot can be reused.
    Extinct { strain: usize },
}

impl Slot {
    fn is_free(&self) -> bool {
        !matches!(self, Slot::Occupied { .. })
    }
}

/// Strain introduced into a slot.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
pub struct Introduction {
    pub slot: usize,
    pub strain: usize,
    /// Strain that previously occupied the slot, if any.
    pub replaced: Option<usize>,
}

/// Explicit bookkeeping of which strain lives in which slot.
///
/// Free slots are reused in ascending index order: when several strains go
/// extinct in the same window, the lowest slot index is reoccupied first.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct SlotTable {
    slots: Vec<Slot>,
    n_strains: usize,
}

impl SlotTable {
    /// Build the table from the strain block of an initial state.
    ///
    /// Every nonzero slot counts as an introduced strain, numbered by slot order.
    pub fn from_state(strains: &[f64]) -> Self {
        let mut n_strains = 0;
        let slots = strains
            .iter()
            .map(|&density| {
                if density > 0.0 {
                    n_strains += 1;
                    Slot::Occupied {
                        strain: n_strains - 1,
                    }
                } else {
                    Slot::Vacant
                }
            })
            .collect();
        Self { slots, n_strains }
    }

    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    /// Total number of strains introduced so far, initial ones included.
    pub fn n_strains(&self) -> usize {
        self.n_strains
    }

    pub fn n_alive(&self) -> usize {
        self.slots.iter().filter(|slot| !slot.is_free()).count()
    }

    /// Mark every occupied slot whose density is exactly zero as extinct.
    ///
    /// Returns the strains that went extinct.
    pub fn record_extinctions(&mut self, strains: &[f64]) -> Vec<usize> {
        let mut extinct = Vec::new();
        for (slot, &density) in self.slots.iter_mut().zip(strains) {
            if let Slot::Occupied { strain } = *slot
                && density == 0.0
            {
                *slot = Slot::Extinct { strain };
                extinct.push(strain);
            }
        }
        extinct
    }

    /// Lowest-index slot that holds no living strain.
    pub fn first_free(&self) -> Option<usize> {
        self.slots.iter().position(Slot::is_free)
    }

    /// Occupy the lowest free slot with a new strain.
    pub fn introduce(&mut self) -> Option<Introduction> {
        let i_slot = self.first_free()?;
        let replaced = match self.slots[i_slot] {
            Slot::Extinct { strain } => Some(strain),
            _ => None,
        };
        let strain = self.n_strains;
        self.slots[i_slot] = Slot::Occupied { strain };
        self.n_strains += 1;
        Some(Introduction {
            slot: i_slot,
            strain,
            replaced,
        })
    }
}
