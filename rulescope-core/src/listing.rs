//! Generic search, sort and pagination over in-memory listings.
//!
//! Every listing (rule files, rules, group and compliance tag universes) goes
//! through the same three steps in the same order: search, sort, paginate.
//! Sorting is stable, so equal keys keep their resolution order.

use crate::error::{Result, RulescopeError};
use crate::types::{Paginated, RuleFile, RuleRecord};
use std::borrow::Cow;
use std::cmp::Ordering;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl FromStr for SortOrder {
    type Err = RulescopeError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "asc" => Ok(SortOrder::Asc),
            "desc" => Ok(SortOrder::Desc),
            other => Err(RulescopeError::InvalidSortOrder(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortSpec {
    pub fields: Vec<String>,
    pub order: SortOrder,
}

impl SortSpec {
    pub fn new<I, S>(fields: I, order: SortOrder) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
            order,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchSpec {
    pub value: String,
    /// Keep the items that do NOT match
    pub negation: bool,
}

impl SearchSpec {
    pub fn new(value: impl Into<String>, negation: bool) -> Self {
        Self {
            value: value.into(),
            negation,
        }
    }
}

/// Search, sort and pagination parameters shared by every listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListOptions {
    pub offset: usize,
    /// `None` returns everything from `offset` on
    pub limit: Option<usize>,
    pub sort: Option<SortSpec>,
    pub search: Option<SearchSpec>,
}

impl ListOptions {
    pub fn unpaginated() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, offset: usize, limit: Option<usize>) -> Self {
        self.offset = offset;
        self.limit = limit;
        self
    }

    pub fn with_sort(mut self, sort: SortSpec) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn with_search(mut self, search: SearchSpec) -> Self {
        self.search = Some(search);
        self
    }
}

/// A value items can be ordered by. Keys of one field always share a variant.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum SortKey<'a> {
    Int(i64),
    Text(&'a str),
}

/// Items whose values can be searched as text.
pub trait Searchable {
    /// Every value of the item rendered as text, nested values included.
    fn search_values(&self) -> Vec<Cow<'_, str>>;
}

/// Items that can be sorted by named fields.
pub trait Sortable {
    /// Field names accepted by `sort_key`.
    const SORT_FIELDS: &'static [&'static str];
    /// Field used when the caller gives no sort.
    const DEFAULT_SORT_FIELD: &'static str;

    fn sort_key(&self, field: &str) -> Option<SortKey<'_>>;
}

/// Case-insensitive substring search over every value of each item.
pub fn search<T: Searchable>(items: Vec<T>, spec: &SearchSpec) -> Vec<T> {
    let needle = spec.value.to_lowercase();
    items
        .into_iter()
        .filter(|item| {
            let found = item
                .search_values()
                .iter()
                .any(|value| value.to_lowercase().contains(&needle));
            found != spec.negation
        })
        .collect()
}

/// Stable sort by the given fields, compared left to right.
///
/// Every field must be one of `T::SORT_FIELDS`; validation happens before any
/// element is moved.
pub fn sort<T: Sortable>(items: &mut [T], fields: &[String], order: SortOrder) -> Result<()> {
    if let Some(bad) = fields
        .iter()
        .find(|field| !T::SORT_FIELDS.contains(&field.as_str()))
    {
        return Err(RulescopeError::InvalidSortField {
            field: bad.clone(),
            allowed: T::SORT_FIELDS.join(", "),
        });
    }

    items.sort_by(|a, b| {
        let ordering = fields
            .iter()
            .map(|field| a.sort_key(field).cmp(&b.sort_key(field)))
            .find(|ordering| *ordering != Ordering::Equal)
            .unwrap_or(Ordering::Equal);
        match order {
            SortOrder::Asc => ordering,
            SortOrder::Desc => ordering.reverse(),
        }
    });
    Ok(())
}

/// Sorts plain string values; only the order matters for them.
pub fn sort_values(values: &mut [String], order: SortOrder) {
    values.sort();
    if order == SortOrder::Desc {
        values.reverse();
    }
}

/// Cuts one page out of `items`, reporting the full count.
pub fn paginate<T>(items: Vec<T>, offset: usize, limit: Option<usize>) -> Paginated<T> {
    let total_items = items.len();
    let page = items
        .into_iter()
        .skip(offset)
        .take(limit.unwrap_or(usize::MAX))
        .collect();
    Paginated {
        items: page,
        total_items,
    }
}

/// Applies search, sort and pagination. Without sort fields the type's
/// default field is used.
pub fn apply<T: Searchable + Sortable>(items: Vec<T>, options: &ListOptions) -> Result<Paginated<T>> {
    let mut items = match &options.search {
        Some(spec) => search(items, spec),
        None => items,
    };

    let default_fields = [T::DEFAULT_SORT_FIELD.to_string()];
    match &options.sort {
        Some(spec) if !spec.fields.is_empty() => sort(&mut items, &spec.fields, spec.order)?,
        Some(spec) => sort(&mut items, &default_fields, spec.order)?,
        None => sort(&mut items, &default_fields, SortOrder::Asc)?,
    }

    Ok(paginate(items, options.offset, options.limit))
}

/// Same pipeline for plain string listings (group and compliance universes).
pub fn apply_values(values: Vec<String>, options: &ListOptions) -> Paginated<String> {
    let mut values = match &options.search {
        Some(spec) => search(values, spec),
        None => values,
    };
    let order = options.sort.as_ref().map(|spec| spec.order).unwrap_or_default();
    sort_values(&mut values, order);
    paginate(values, options.offset, options.limit)
}

// ===== LISTING IMPLEMENTATIONS =====

impl Searchable for String {
    fn search_values(&self) -> Vec<Cow<'_, str>> {
        vec![Cow::Borrowed(self.as_str())]
    }
}

impl Searchable for RuleFile {
    fn search_values(&self) -> Vec<Cow<'_, str>> {
        vec![
            Cow::Borrowed(self.name.as_str()),
            Cow::Borrowed(self.status.as_str()),
        ]
    }
}

impl Sortable for RuleFile {
    const SORT_FIELDS: &'static [&'static str] = &["name", "status"];
    const DEFAULT_SORT_FIELD: &'static str = "name";

    fn sort_key(&self, field: &str) -> Option<SortKey<'_>> {
        match field {
            "name" => Some(SortKey::Text(&self.name)),
            "status" => Some(SortKey::Text(self.status.as_str())),
            _ => None,
        }
    }
}

impl Searchable for RuleRecord {
    fn search_values(&self) -> Vec<Cow<'_, str>> {
        let mut values = vec![
            Cow::Borrowed(self.file.as_str()),
            Cow::Owned(self.id.to_string()),
            Cow::Owned(self.level.to_string()),
            Cow::Borrowed(self.description.as_str()),
            Cow::Borrowed(self.status.as_str()),
        ];
        values.extend(self.groups.iter().map(Cow::Borrowed));
        values.extend(self.compliance.iter().map(Cow::Borrowed));
        for detail in self.details.values() {
            values.extend(detail.values().iter().map(|v| Cow::Borrowed(v.as_str())));
        }
        values
    }
}

impl Sortable for RuleRecord {
    const SORT_FIELDS: &'static [&'static str] =
        &["file", "source_file", "description", "id", "level", "status"];
    const DEFAULT_SORT_FIELD: &'static str = "id";

    fn sort_key(&self, field: &str) -> Option<SortKey<'_>> {
        match field {
            "file" | "source_file" => Some(SortKey::Text(&self.file)),
            "description" => Some(SortKey::Text(&self.description)),
            "id" => Some(SortKey::Int(self.id)),
            "level" => Some(SortKey::Int(self.level)),
            "status" => Some(SortKey::Text(self.status.as_str())),
            _ => None,
        }
    }
}
