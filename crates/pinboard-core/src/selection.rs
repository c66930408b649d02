use std::collections::VecDeque;

/// Attribute-name column of a card.
pub const NAME_COLUMN: usize = 0;
/// Attribute-value column of a card.
pub const VALUE_COLUMN: usize = 1;

///
/// Selection
///
/// The cursor: which card, which column (name/value) and which attribute row
/// inside it, plus the edit-mode flag. A `row` equal to the card's row count
/// addresses the "append new attribute" affordance.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Selection {
    pub card: usize,
    pub column: usize,
    pub row: usize,
    pub edit_mode: bool,
}

///
/// SelectionView
///
/// Read-only projection handed to the visual layer.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SelectionView {
    pub column: usize,
    pub row: usize,
    pub edit_mode: bool,
}

///
/// SelectionState
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SelectionState {
    /// No selection exists yet (or a structural reset cleared it).
    Idle,
    Selected,
    Editing,
}

///
/// Advance
///
/// Where `select_next` landed.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Advance {
    /// Cursor moved to another cell of an existing card.
    Moved,
    /// Cursor ran past the last existing card; the caller should create a
    /// new card and select its first (empty) attribute row.
    NewCardSlot,
}

///
/// DeferredSelect
///
/// Selection moves queued behind a grid/row mutation. They run when the host
/// calls `settle`, after the visual tree reflects the mutation; clamping at
/// that point resolves rows that no longer exist.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DeferredSelect {
    Cell { card: usize, column: usize, row: usize },
    /// The value cell of the card's last real row (post row-append).
    LastRowValue { card: usize },
    /// One row above the current selection (post row-removal).
    RowAbove,
}

///
/// SelectionController
///
/// Owns the cursor and the deferred-move queue. All coordinates are clamped
/// against the current card/row shape on every mutation; the controller never
/// holds an out-of-bounds or negative cell.
///

#[derive(Debug, Default)]
pub struct SelectionController {
    selection: Option<Selection>,
    deferred: VecDeque<DeferredSelect>,
}

impl SelectionController {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            selection: None,
            deferred: VecDeque::new(),
        }
    }

    // ------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------

    #[must_use]
    pub const fn selection(&self) -> Option<&Selection> {
        self.selection.as_ref()
    }

    #[must_use]
    pub fn view(&self) -> Option<SelectionView> {
        self.selection.map(|sel| SelectionView {
            column: sel.column,
            row: sel.row,
            edit_mode: sel.edit_mode,
        })
    }

    #[must_use]
    pub const fn state(&self) -> SelectionState {
        match &self.selection {
            None => SelectionState::Idle,
            Some(sel) if sel.edit_mode => SelectionState::Editing,
            Some(_) => SelectionState::Selected,
        }
    }

    #[must_use]
    pub fn was_previously_selected(&self, card: usize, column: usize, row: usize) -> bool {
        self.selection
            .is_some_and(|sel| sel.card == card && sel.column == column && sel.row == row)
    }

    // ------------------------------------------------------------------
    // Transitions
    // ------------------------------------------------------------------

    /// First navigation input (arrow/Tab/Enter) while no selection exists:
    /// initialize the cursor at the origin cell. A later input is a no-op.
    pub fn initialize_if_needed(&mut self, row_counts: &[usize]) {
        if self.selection.is_none() && !row_counts.is_empty() {
            self.selection = Some(Selection {
                card: 0,
                column: NAME_COLUMN,
                row: 0,
                edit_mode: false,
            });
        }
    }

    /// Click on a cell: a click on the current selection opens edit mode, a
    /// click anywhere else only moves the selection.
    pub fn click(&mut self, card: usize, column: usize, row: usize, row_counts: &[usize]) {
        let edit_mode = self.was_previously_selected(card, column, row);
        self.select(card, column, row, edit_mode, row_counts);
    }

    /// Place the cursor, clamped to the nearest valid cell.
    pub fn select(
        &mut self,
        card: usize,
        column: usize,
        row: usize,
        edit_mode: bool,
        row_counts: &[usize],
    ) {
        if row_counts.is_empty() {
            self.selection = None;
            return;
        }

        let card = card.min(row_counts.len() - 1);
        self.selection = Some(Selection {
            card,
            column: column.min(VALUE_COLUMN),
            // The affordance row sits one past the last real row.
            row: row.min(row_counts[card]),
            edit_mode,
        });
    }

    /// Advance to the next cell: name → value, then the next row, then the
    /// next card. Past the last existing card (or on an empty grid) the
    /// caller gets [`Advance::NewCardSlot`] and is expected to append a new
    /// card.
    pub fn select_next(&mut self, row_counts: &[usize]) -> Advance {
        if row_counts.is_empty() {
            self.selection = None;
            return Advance::NewCardSlot;
        }
        let Some(sel) = self.selection else {
            self.initialize_if_needed(row_counts);
            return Advance::Moved;
        };

        let (mut card, mut column, mut row) = (sel.card, sel.column, sel.row);

        if column < VALUE_COLUMN {
            column = VALUE_COLUMN;
        } else {
            column = NAME_COLUMN;
            row += 1;
        }

        // Past the affordance row: move on to the next card.
        if card < row_counts.len() && row > row_counts[card] {
            card += 1;
            row = 0;
            column = NAME_COLUMN;
        }

        if card >= row_counts.len() {
            self.selection = None;
            return Advance::NewCardSlot;
        }

        self.selection = Some(Selection {
            card,
            column,
            row,
            edit_mode: sel.edit_mode,
        });

        Advance::Moved
    }

    /// Move one visual row of cards up or down; inside a card the cursor
    /// walks attribute rows first.
    pub fn move_vertical(&mut self, down: bool, row_counts: &[usize], cards_per_row: usize) {
        let Some(sel) = self.selection else {
            self.initialize_if_needed(row_counts);
            return;
        };
        if row_counts.is_empty() {
            self.selection = None;
            return;
        }

        let cards_per_row = cards_per_row.max(1);
        let (mut card, mut row) = (sel.card, sel.row);

        if down {
            if row < row_counts[card.min(row_counts.len() - 1)] {
                row += 1;
            } else if card + cards_per_row < row_counts.len() {
                card += cards_per_row;
                row = 0;
            }
        } else if row > 0 {
            row -= 1;
        } else if card >= cards_per_row {
            card -= cards_per_row;
            row = row_counts.get(card).copied().unwrap_or(0);
        }

        self.select(card, sel.column, row, false, row_counts);
    }

    /// Leave edit mode, keeping the cell selected.
    pub fn exit_edit_mode(&mut self) {
        if let Some(sel) = &mut self.selection {
            sel.edit_mode = false;
        }
    }

    /// Structural reset: no selection survives a query change.
    pub fn clear(&mut self) {
        self.selection = None;
        self.deferred.clear();
    }

    // ------------------------------------------------------------------
    // Clamping and deferred moves
    // ------------------------------------------------------------------

    /// Re-validate the cursor after the grid changed shape underneath it.
    pub fn clamp(&mut self, row_counts: &[usize]) {
        let Some(sel) = self.selection else {
            return;
        };

        if row_counts.is_empty() {
            self.selection = None;
            return;
        }

        self.select(sel.card, sel.column, sel.row, sel.edit_mode, row_counts);
    }

    /// Queue a selection move to run after the current mutation settles.
    pub fn defer(&mut self, op: DeferredSelect) {
        self.deferred.push_back(op);
    }

    #[must_use]
    pub fn has_deferred(&self) -> bool {
        !self.deferred.is_empty()
    }

    /// Run queued moves against the settled grid shape, in order.
    pub fn settle(&mut self, row_counts: &[usize]) {
        while let Some(op) = self.deferred.pop_front() {
            match op {
                DeferredSelect::Cell { card, column, row } => {
                    self.select(card, column, row, false, row_counts);
                }
                DeferredSelect::LastRowValue { card } => {
                    let rows = row_counts.get(card).copied().unwrap_or(0);
                    let last_real = rows.saturating_sub(1);
                    self.select(card, VALUE_COLUMN, last_real, true, row_counts);
                }
                DeferredSelect::RowAbove => {
                    if let Some(sel) = self.selection {
                        self.select(
                            sel.card,
                            sel.column,
                            sel.row.saturating_sub(1),
                            false,
                            row_counts,
                        );
                    }
                }
            }
        }
    }
}
