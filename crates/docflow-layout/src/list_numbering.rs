//! List counters for one layout pass.

use std::collections::HashMap;

use docflow::{NumberingRef, NumberingRegistry};

/// Per-(list, level) counters.
///
/// A shallower level resets the deeper counters of the same list. A
/// paragraph outside any list, or in a different list, clears everything.
#[derive(Clone, Debug, Default)]
pub struct NumberingState {
    counters: HashMap<(String, u8), u32>,
    current_list: Option<String>,
}

impl NumberingState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget all counters.
    pub fn reset(&mut self) {
        self.counters.clear();
        self.current_list = None;
    }

    /// Advance counters for the next paragraph and return its marker text.
    ///
    /// `None` for non-list paragraphs and for references to unknown lists.
    pub fn next_marker(
        &mut self,
        numbering: Option<&NumberingRef>,
        registry: &NumberingRegistry,
    ) -> Option<String> {
        let Some(num) = numbering else {
            self.reset();
            return None;
        };
        if self.current_list.as_deref() != Some(num.list_id.as_str()) {
            self.reset();
            self.current_list = Some(num.list_id.clone());
        }
        let Some(list) = registry.list(&num.list_id) else {
            log::debug!("paragraph references unknown list '{}'", num.list_id);
            return None;
        };
        let start = list
            .levels
            .get(num.level as usize)
            .map_or(1, |level| level.start);
        self.counters
            .retain(|(list_id, level), _| list_id != &num.list_id || *level <= num.level);
        let value = *self
            .counters
            .entry((num.list_id.clone(), num.level))
            .and_modify(|c| *c += 1)
            .or_insert(start);
        let counters: Vec<u32> = (0..=num.level)
            .map(|level| {
                self.counters
                    .get(&(num.list_id.clone(), level))
                    .copied()
                    .unwrap_or_else(|| {
                        list.levels
                            .get(level as usize)
                            .map_or(1, |l| l.start)
                    })
            })
            .collect();
        log::trace!("list '{}' level {} -> {}", num.list_id, num.level, value);
        Some(list.marker_text(num.level as usize, &counters))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docflow::{LevelDefinition, ListDefinition, NumberFormat};

    fn registry() -> NumberingRegistry {
        let mut reg = NumberingRegistry::default();
        reg.lists.insert(
            "1".into(),
            ListDefinition {
                levels: vec![
                    LevelDefinition::default(),
                    LevelDefinition {
                        format: NumberFormat::LowerLetter,
                        text: "%2)".into(),
                        ..LevelDefinition::default()
                    },
                ],
            },
        );
        reg.lists.insert(
            "2".into(),
            ListDefinition {
                levels: vec![LevelDefinition {
                    format: NumberFormat::UpperRoman,
                    text: "%1.".into(),
                    ..LevelDefinition::default()
                }],
            },
        );
        reg
    }

    fn at(list: &str, level: u8) -> NumberingRef {
        NumberingRef {
            list_id: list.into(),
            level,
        }
    }

    #[test]
    fn shallower_level_resets_deeper_counters() {
        let reg = registry();
        let mut state = NumberingState::new();
        let seq: Vec<Option<String>> = [(0, "1"), (1, "1"), (1, "1"), (0, "1"), (1, "1")]
            .iter()
            .map(|(level, list)| state.next_marker(Some(&at(list, *level)), &reg))
            .collect();
        assert_eq!(
            seq,
            vec![
                Some("1.".to_string()),
                Some("a)".to_string()),
                Some("b)".to_string()),
                Some("2.".to_string()),
                Some("a)".to_string()),
            ]
        );
    }

    #[test]
    fn non_list_paragraph_and_list_switch_clear_counters() {
        let reg = registry();
        let mut state = NumberingState::new();
        state.next_marker(Some(&at("1", 0)), &reg);
        state.next_marker(Some(&at("1", 0)), &reg);
        assert_eq!(state.next_marker(None, &reg), None);
        assert_eq!(state.next_marker(Some(&at("1", 0)), &reg).as_deref(), Some("1."));
        assert_eq!(state.next_marker(Some(&at("2", 0)), &reg).as_deref(), Some("I."));
        assert_eq!(state.next_marker(Some(&at("1", 0)), &reg).as_deref(), Some("1."));
    }

    #[test]
    fn unknown_list_has_no_marker() {
        let reg = registry();
        let mut state = NumberingState::new();
        assert_eq!(state.next_marker(Some(&at("missing", 0)), &reg), None);
    }
}
