use crate::action::Action;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

const PAGE_BINDING_PREFIX: &str = "get_";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NavigationRequest {
    pub session_id: String,
    pub seq: u64,
    pub app: Option<String>,
    pub actions: Vec<Action>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationsRequest {
    pub session_id: String,
    pub seq: u64,
    pub app: Option<String>,
    pub page: Option<String>,
    pub actions: Vec<Action>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NavigationResponse {
    pub items: Vec<MenuItem>,
    pub location: Option<NavLocation>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MenuItem {
    pub header: Option<String>,
    pub entries: Vec<MenuEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MenuEntry {
    pub title: String,
    pub icon: Option<String>,
    pub is_default: bool,
    pub page: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NavLocation {
    #[default]
    Sidebar,
    Hidden,
}

/// Callable identity for one page. Invoking it runs that page's operations.
#[derive(Debug, PartialEq, Eq)]
pub struct PageBinding {
    name: String,
    page: String,
}

impl PageBinding {
    /// Registered name, derived from the page name.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn page(&self) -> &str {
        &self.page
    }
}

/// Page name → binding, populated on first request and kept for the
/// client's lifetime.
#[derive(Debug, Default)]
pub struct PageRegistry {
    bindings: HashMap<String, Arc<PageBinding>>,
}

impl PageRegistry {
    pub fn binding(&mut self, page: &str) -> Arc<PageBinding> {
        self.bindings
            .entry(page.to_string())
            .or_insert_with(|| {
                let binding = PageBinding {
                    name: format!("{PAGE_BINDING_PREFIX}{page}"),
                    page: page.to_string(),
                };
                debug!(name = %binding.name, "registered page binding");
                Arc::new(binding)
            })
            .clone()
    }

    /// Looks a binding up by its registered name.
    pub fn by_name(&self, name: &str) -> Option<Arc<PageBinding>> {
        let page = name.strip_prefix(PAGE_BINDING_PREFIX)?;
        self.bindings.get(page).cloned()
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct MenuPage {
    pub title: String,
    pub icon: Option<String>,
    pub is_default: bool,
    pub binding: Arc<PageBinding>,
}

#[derive(Debug, Clone)]
pub enum NavigationMenu {
    Flat(Vec<MenuPage>),
    Grouped(Vec<(Option<String>, Vec<MenuPage>)>),
}

impl NavigationMenu {
    /// Groups entries by header. Returns `None` when there is nothing to
    /// show, and a flat list when the only group has no header.
    pub fn build(items: &[MenuItem], registry: &mut PageRegistry) -> Option<Self> {
        let mut groups: Vec<(Option<String>, Vec<MenuPage>)> = Vec::new();

        for item in items {
            let pages = item
                .entries
                .iter()
                .map(|entry| MenuPage {
                    title: entry.title.clone(),
                    icon: entry.icon.clone().filter(|icon| !icon.is_empty()),
                    is_default: entry.is_default,
                    binding: registry.binding(&entry.page),
                })
                .collect();

            match groups.iter_mut().find(|(header, _)| *header == item.header) {
                Some((_, existing)) => *existing = pages,
                None => groups.push((item.header.clone(), pages)),
            }
        }

        match groups.len() {
            0 => None,
            1 if groups[0].0.is_none() => groups.pop().map(|(_, pages)| NavigationMenu::Flat(pages)),
            _ => Some(NavigationMenu::Grouped(groups)),
        }
    }

    pub fn pages(&self) -> impl Iterator<Item = &MenuPage> {
        let (flat, grouped) = match self {
            NavigationMenu::Flat(pages) => (pages.as_slice(), &[][..]),
            NavigationMenu::Grouped(groups) => (&[][..], groups.as_slice()),
        };
        flat.iter()
            .chain(grouped.iter().flat_map(|(_, pages)| pages.iter()))
    }

    /// The entry flagged default, else the first entry.
    pub fn default_page(&self) -> Option<&MenuPage> {
        self.pages()
            .find(|page| page.is_default)
            .or_else(|| self.pages().next())
    }

    pub fn find(&self, page: &str) -> Option<&MenuPage> {
        self.pages().find(|entry| entry.binding.page() == page)
    }
}
