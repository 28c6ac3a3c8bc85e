//! Reconciliation engine
//!
//! Merges the live agent set with persisted customization into the display
//! list. Ordering grows only by appending unseen ids (in arrival order) or
//! by an explicit operator move; filters never touch it.

mod filter;

pub use filter::{next_priority, next_tag, FilterState, StatusTab};

use crate::agent::{Agent, Priority};
use crate::store::{CustomizationStore, DurableStore};
use std::collections::{BTreeSet, HashMap, HashSet};

/// Move the element at `from` to `to`, returning the new list.
///
/// Out-of-range `from` leaves the list unchanged; `to` is clamped to the
/// last position.
pub fn reorder<T: Clone>(list: &[T], from: usize, to: usize) -> Vec<T> {
    let mut out = list.to_vec();
    if from >= out.len() {
        return out;
    }
    let to = to.min(out.len() - 1);
    let item = out.remove(from);
    out.insert(to, item);
    out
}

/// Append ids not yet in `ordering`, preserving their arrival order.
/// Returns true when anything was appended.
pub fn append_new<'a>(ordering: &mut Vec<String>, live_ids: impl IntoIterator<Item = &'a str>) -> bool {
    let mut known: HashSet<String> = ordering.iter().cloned().collect();
    let before = ordering.len();
    for id in live_ids {
        if known.insert(id.to_string()) {
            ordering.push(id.to_string());
        }
    }
    ordering.len() != before
}

/// Drop ids absent from the live set. Returns true when anything was removed.
pub fn prune(ordering: &mut Vec<String>, live: &HashSet<&str>) -> bool {
    let before = ordering.len();
    ordering.retain(|id| live.contains(id.as_str()));
    ordering.len() != before
}

fn prune_set(set: &mut BTreeSet<String>, live: &HashSet<&str>) -> bool {
    let before = set.len();
    set.retain(|id| live.contains(id.as_str()));
    set.len() != before
}

/// Filter `agents` and sort them by their position in `ordering`.
/// Ids missing from `ordering` sort last, keeping their relative order.
pub fn ordered_view<'a>(agents: &'a [Agent], ordering: &[String], filters: &FilterState) -> Vec<&'a Agent> {
    let position: HashMap<&str, usize> = ordering
        .iter()
        .enumerate()
        .map(|(i, id)| (id.as_str(), i))
        .collect();

    let mut visible: Vec<&Agent> = agents.iter().filter(|a| filters.matches(a)).collect();
    visible.sort_by_key(|a| position.get(a.id.as_str()).copied().unwrap_or(usize::MAX));
    visible
}

/// One row of the display list
#[derive(Debug, Clone, Copy)]
pub struct DisplayRow<'a> {
    pub agent: &'a Agent,
    pub collapsed: bool,
    pub selected: bool,
}

/// Owner of the ordering, collapse, selection and filter state
pub struct Reconciler<S: DurableStore> {
    store: CustomizationStore<S>,
    ordering: Vec<String>,
    collapsed: BTreeSet<String>,
    selected: BTreeSet<String>,
    filters: FilterState,
}

impl<S: DurableStore> Reconciler<S> {
    /// Hydrate from the store; corrupt or missing values become defaults
    pub fn load(store: CustomizationStore<S>) -> Self {
        let ordering = store.load_ordering();
        let collapsed = store.load_collapsed();
        let selected = store.load_selected();
        let filters = store.load_filters();
        Self {
            store,
            ordering,
            collapsed,
            selected,
            filters,
        }
    }

    pub fn ordering(&self) -> &[String] {
        &self.ordering
    }

    pub fn filters(&self) -> &FilterState {
        &self.filters
    }

    pub fn selected(&self) -> &BTreeSet<String> {
        &self.selected
    }

    pub fn collapsed(&self) -> &BTreeSet<String> {
        &self.collapsed
    }

    pub fn is_selected(&self, id: &str) -> bool {
        self.selected.contains(id)
    }

    /// Fold a live agent set into the local state.
    ///
    /// Unseen ids are appended; ids that left the fleet are dropped from
    /// ordering, selection and collapse.
    pub fn on_snapshot(&mut self, agents: &[Agent]) {
        let live: HashSet<&str> = agents.iter().map(|a| a.id.as_str()).collect();
        let appended = append_new(&mut self.ordering, agents.iter().map(|a| a.id.as_str()));
        let pruned = prune(&mut self.ordering, &live);

        if prune_set(&mut self.selected, &live) {
            self.store.save_selected(&self.selected);
        }
        if prune_set(&mut self.collapsed, &live) {
            self.store.save_collapsed(&self.collapsed);
        }
        if appended || pruned {
            self.store.save_ordering(&self.ordering);
        }
    }

    /// Give demo rows an ordering slot for this session only. Nothing is
    /// pruned or written to the store.
    pub fn show_demo(&mut self, agents: &[Agent]) {
        append_new(&mut self.ordering, agents.iter().map(|a| a.id.as_str()));
    }

    /// Filtered, ordered rows ready for rendering
    pub fn display_list<'a>(&self, agents: &'a [Agent]) -> Vec<DisplayRow<'a>> {
        ordered_view(agents, &self.ordering, &self.filters)
            .into_iter()
            .map(|agent| DisplayRow {
                agent,
                collapsed: self.collapsed.contains(&agent.id),
                selected: self.selected.contains(&agent.id),
            })
            .collect()
    }

    /// Move an entry of the ordering list (pointer drag)
    pub fn move_item(&mut self, from: usize, to: usize) {
        self.ordering = reorder(&self.ordering, from, to);
        self.store.save_ordering(&self.ordering);
    }

    /// Move `id` by `delta` rows within the current display list (keyboard).
    /// Returns false when the move is not possible.
    pub fn move_visible(&mut self, agents: &[Agent], id: &str, delta: isize) -> bool {
        let visible: Vec<&str> = ordered_view(agents, &self.ordering, &self.filters)
            .into_iter()
            .map(|a| a.id.as_str())
            .collect();

        let Some(pos) = visible.iter().position(|v| *v == id) else {
            return false;
        };
        let Some(target) = pos.checked_add_signed(delta).filter(|t| *t < visible.len()) else {
            return false;
        };
        if target == pos {
            return false;
        }

        let from = self.ordering.iter().position(|o| o == id);
        let to = self.ordering.iter().position(|o| o == visible[target]);
        match (from, to) {
            (Some(from), Some(to)) => {
                self.move_item(from, to);
                true
            }
            _ => false,
        }
    }

    pub fn toggle_collapse(&mut self, id: &str) {
        if !self.collapsed.remove(id) {
            self.collapsed.insert(id.to_string());
        }
        self.store.save_collapsed(&self.collapsed);
    }

    pub fn toggle_select(&mut self, id: &str) {
        if !self.selected.remove(id) {
            self.selected.insert(id.to_string());
        }
        self.store.save_selected(&self.selected);
    }

    /// Select every currently visible agent
    pub fn select_all(&mut self, agents: &[Agent]) {
        for agent in ordered_view(agents, &self.ordering, &self.filters) {
            self.selected.insert(agent.id.clone());
        }
        self.store.save_selected(&self.selected);
    }

    pub fn deselect_all(&mut self) {
        self.selected.clear();
        self.store.save_selected(&self.selected);
    }

    /// Forget a single id everywhere (e.g. after a kill)
    pub fn forget(&mut self, id: &str) {
        if self.selected.remove(id) {
            self.store.save_selected(&self.selected);
        }
        if self.collapsed.remove(id) {
            self.store.save_collapsed(&self.collapsed);
        }
    }

    pub fn set_filter(&mut self, filters: FilterState) {
        self.filters = filters;
        self.store.save_filters(&self.filters);
    }

    pub fn set_tab(&mut self, tab: StatusTab) {
        let mut filters = self.filters.clone();
        filters.tab = tab;
        self.set_filter(filters);
    }

    pub fn set_search(&mut self, text: &str) {
        let mut filters = self.filters.clone();
        filters.text = text.to_string();
        self.set_filter(filters);
    }

    pub fn set_priority(&mut self, priority: Option<Priority>) {
        let mut filters = self.filters.clone();
        filters.priority = priority;
        self.set_filter(filters);
    }

    pub fn set_tag(&mut self, tag: Option<String>) {
        let mut filters = self.filters.clone();
        filters.tag = tag;
        self.set_filter(filters);
    }

    /// Selected ids present in `agents`, in display order (filters ignored)
    pub fn selected_ids(&self, agents: &[Agent]) -> Vec<String> {
        ordered_view(agents, &self.ordering, &FilterState::default())
            .into_iter()
            .filter(|a| self.selected.contains(&a.id))
            .map(|a| a.id.clone())
            .collect()
    }

    /// Wipe all customization, in memory and on disk
    pub fn reset(&mut self) {
        self.ordering.clear();
        self.collapsed.clear();
        self.selected.clear();
        self.filters = FilterState::default();
        self.store.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::tests::agent;
    use crate::agent::AgentStatus;
    use crate::store::MemoryStore;

    fn agents(ids: &[&str]) -> Vec<Agent> {
        ids.iter().map(|id| agent(id, AgentStatus::Active)).collect()
    }

    fn ids(rows: &[DisplayRow<'_>]) -> Vec<String> {
        rows.iter().map(|r| r.agent.id.clone()).collect()
    }

    fn reconciler() -> Reconciler<MemoryStore> {
        Reconciler::load(CustomizationStore::new(MemoryStore::new()))
    }

    #[test]
    fn test_reorder_moves_and_clamps() {
        let list = vec!["a", "b", "c", "d"];
        assert_eq!(reorder(&list, 0, 2), vec!["b", "c", "a", "d"]);
        assert_eq!(reorder(&list, 3, 0), vec!["d", "a", "b", "c"]);
        assert_eq!(reorder(&list, 1, 99), vec!["a", "c", "d", "b"]);
        assert_eq!(reorder(&list, 9, 0), list);
        let empty: Vec<&str> = vec![];
        assert!(reorder(&empty, 0, 0).is_empty());
    }

    #[test]
    fn test_reorder_same_index_is_noop() {
        let mut r = reconciler();
        r.on_snapshot(&agents(&["a", "b", "c"]));
        let before = r.ordering().to_vec();
        r.move_item(1, 1);
        assert_eq!(r.ordering(), before.as_slice());
    }

    #[test]
    fn test_new_ids_append_at_tail() {
        let mut r = reconciler();
        r.on_snapshot(&agents(&["a", "b"]));
        r.on_snapshot(&agents(&["c", "a", "b"]));
        assert_eq!(r.ordering(), ["a", "b", "c"]);
    }

    #[test]
    fn test_newcomers_keep_arrival_order() {
        let mut r = reconciler();
        r.on_snapshot(&agents(&["a"]));
        r.on_snapshot(&agents(&["z", "a", "m"]));
        assert_eq!(r.ordering(), ["a", "z", "m"]);
    }

    #[test]
    fn test_missing_ids_dropped_without_error() {
        let mut r = reconciler();
        r.on_snapshot(&agents(&["a", "b", "c"]));
        r.toggle_select("b");
        r.toggle_collapse("b");

        let live = agents(&["a", "c"]);
        r.on_snapshot(&live);
        assert_eq!(ids(&r.display_list(&live)), vec!["a", "c"]);
        assert_eq!(r.ordering(), ["a", "c"]);
        assert!(r.selected().is_empty());
        assert!(r.collapsed().is_empty());
    }

    #[test]
    fn test_display_list_exactly_matches_latest_snapshot() {
        let mut r = reconciler();
        let s1 = agents(&["a", "b", "c"]);
        r.on_snapshot(&s1);
        let s2 = agents(&["d", "b"]);
        r.on_snapshot(&s2);
        assert_eq!(ids(&r.display_list(&s2)), vec!["b", "d"]);
    }

    #[test]
    fn test_unknown_ids_sort_last() {
        let r = reconciler();
        let live = agents(&["x", "y"]);
        let ordering = vec!["y".to_string()];
        let view = ordered_view(&live, &ordering, r.filters());
        let got: Vec<_> = view.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(got, vec!["y", "x"]);
    }

    #[test]
    fn test_filter_changes_never_touch_ordering() {
        let mut r = reconciler();
        let mut live = agents(&["a", "b", "c"]);
        live[1].status = AgentStatus::Failed;
        r.on_snapshot(&live);
        let before = r.ordering().to_vec();

        r.set_tab(StatusTab::Failed);
        assert_eq!(ids(&r.display_list(&live)), vec!["b"]);
        r.set_search("nothing");
        assert!(r.display_list(&live).is_empty());
        r.set_filter(FilterState::default());

        assert_eq!(r.ordering(), before.as_slice());
        assert_eq!(r.display_list(&live).len(), 3);
    }

    #[test]
    fn test_move_visible_skips_hidden_rows() {
        let mut r = reconciler();
        let mut live = agents(&["a", "h", "b"]);
        live[1].status = AgentStatus::Completed;
        r.on_snapshot(&live);
        r.set_tab(StatusTab::Active);

        assert!(r.move_visible(&live, "a", 1));
        assert_eq!(r.ordering(), ["h", "b", "a"]);
        assert_eq!(ids(&r.display_list(&live)), vec!["b", "a"]);

        assert!(!r.move_visible(&live, "a", 1));
        assert!(!r.move_visible(&live, "missing", -1));
        assert!(r.move_visible(&live, "a", -1));
        assert_eq!(ids(&r.display_list(&live)), vec!["a", "b"]);
    }

    #[test]
    fn test_selection_helpers() {
        let mut r = reconciler();
        let mut live = agents(&["a", "b", "c"]);
        live[2].status = AgentStatus::Failed;
        r.on_snapshot(&live);
        r.set_tab(StatusTab::Active);
        r.select_all(&live);
        assert_eq!(r.selected_ids(&live), vec!["a", "b"]);

        r.move_item(0, 1);
        assert_eq!(r.selected_ids(&live), vec!["b", "a"]);

        r.deselect_all();
        assert!(r.selected_ids(&live).is_empty());
    }

    #[test]
    fn test_state_persists_across_reload() {
        let store = CustomizationStore::new(MemoryStore::new());
        let mut r = Reconciler::load(store);
        let live = agents(&["a", "b"]);
        r.on_snapshot(&live);
        r.move_item(1, 0);
        r.toggle_select("a");
        r.set_tab(StatusTab::Completed);
        r.set_priority(Some(Priority::High));
        r.set_tag(Some("ops".to_string()));

        let Reconciler { store, .. } = r;
        let reloaded = Reconciler::load(store);
        assert_eq!(reloaded.ordering(), ["b", "a"]);
        assert!(reloaded.is_selected("a"));
        assert_eq!(reloaded.filters().tab, StatusTab::Completed);
        assert_eq!(reloaded.filters().priority, Some(Priority::High));
        assert_eq!(reloaded.filters().tag.as_deref(), Some("ops"));
    }

    #[test]
    fn test_demo_rows_are_never_persisted() {
        let store = CustomizationStore::new(MemoryStore::new());
        let mut r = Reconciler::load(store);
        r.on_snapshot(&agents(&["live-1"]));
        r.show_demo(&agents(&["demo-1"]));
        assert_eq!(r.ordering(), ["live-1", "demo-1"]);

        let Reconciler { store, .. } = r;
        let reloaded = Reconciler::load(store);
        assert_eq!(reloaded.ordering(), ["live-1"]);
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut r = reconciler();
        let live = agents(&["a"]);
        r.on_snapshot(&live);
        r.toggle_select("a");
        r.set_search("a");
        r.reset();
        assert!(r.ordering().is_empty());
        assert!(r.selected().is_empty());
        assert_eq!(r.filters(), &FilterState::default());
    }
}
