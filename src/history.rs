use crate::model::HistoryItem;

pub const HISTORY_LIMIT: usize = 15;

/// Put `item` at the front of `history`, dropping any older entry with the
/// same id and everything past the limit.
pub fn push_history(history: &mut Vec<HistoryItem>, item: HistoryItem) {
    history.retain(|h| h.id != item.id);
    history.insert(0, item);
    history.truncate(HISTORY_LIMIT);
}
