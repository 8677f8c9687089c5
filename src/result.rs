//! Extraction options and the per-mapping result stream.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde_json::Value;

use crate::builders::{MapBuilder, ResultBuilder};
use crate::mapping::{MappingGroup, MappingRecord};
use crate::path::{self, MappingError};

/// Extraction knobs for one result request.
///
/// Builders default to [`MapBuilder`] for both groups; missing source
/// keys fail either group unless that group is told to skip them.
#[derive(Debug, Clone)]
pub struct ResultOptions<'a, D = MapBuilder, E = MapBuilder> {
    pub(crate) source: Option<&'a str>,
    pub(crate) data_builder: D,
    pub(crate) extra_builder: E,
    pub(crate) data_ignore_missing: bool,
    pub(crate) extra_ignore_missing: bool,
}

impl<'a> ResultOptions<'a> {
    pub fn new() -> Self {
        Self {
            source: None,
            data_builder: MapBuilder,
            extra_builder: MapBuilder,
            data_ignore_missing: false,
            extra_ignore_missing: false,
        }
    }
}

impl<'a> Default for ResultOptions<'a> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a, D, E> ResultOptions<'a, D, E> {
    /// Routing key to fall back to when the message has no identity.
    pub fn with_source(mut self, source: &'a str) -> Self {
        self.source = Some(source);
        self
    }

    /// Replace the builder for the data group.
    pub fn with_data_builder<D2>(self, data_builder: D2) -> ResultOptions<'a, D2, E> {
        ResultOptions {
            source: self.source,
            data_builder,
            extra_builder: self.extra_builder,
            data_ignore_missing: self.data_ignore_missing,
            extra_ignore_missing: self.extra_ignore_missing,
        }
    }

    /// Replace the builder for the extra group.
    pub fn with_extra_builder<E2>(self, extra_builder: E2) -> ResultOptions<'a, D, E2> {
        ResultOptions {
            source: self.source,
            data_builder: self.data_builder,
            extra_builder,
            data_ignore_missing: self.data_ignore_missing,
            extra_ignore_missing: self.extra_ignore_missing,
        }
    }

    /// Skip missing source keys in the data group instead of failing.
    pub fn with_data_ignore_missing(mut self, ignore: bool) -> Self {
        self.data_ignore_missing = ignore;
        self
    }

    /// Skip missing source keys in the extra group instead of failing.
    pub fn with_extra_ignore_missing(mut self, ignore: bool) -> Self {
        self.extra_ignore_missing = ignore;
        self
    }
}

/// Both extraction outputs for one mapping configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct Extracted<D, E> {
    pub data: D,
    pub extra: E,
}

/// Result for one distinct mapping configuration.
///
/// `filter_ids` names every registered filter sharing the configuration;
/// a failed extraction reports the error in place of the outputs without
/// affecting the other configurations of the same message.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterResult<D, E> {
    pub filter_ids: BTreeSet<String>,
    pub outcome: Result<Extracted<D, E>, MappingError>,
}

impl<D, E> FilterResult<D, E> {
    /// Outputs, if extraction succeeded.
    pub fn extracted(&self) -> Option<&Extracted<D, E>> {
        self.outcome.as_ref().ok()
    }

    /// Extraction error, if any.
    pub fn error(&self) -> Option<&MappingError> {
        self.outcome.as_ref().err()
    }
}

/// Lazy stream of [`FilterResult`]s, one per distinct mapping
/// configuration routed to the message.
///
/// Extraction runs in [`Iterator::next`], against a snapshot taken while
/// the handler lock was held; concurrent registry changes do not affect
/// an iterator already obtained.
#[derive(Debug)]
pub struct FilterResults<'m, D = MapBuilder, E = MapBuilder> {
    message: &'m Value,
    items: std::vec::IntoIter<(Arc<MappingRecord>, BTreeSet<String>)>,
    data_builder: D,
    extra_builder: E,
    data_ignore_missing: bool,
    extra_ignore_missing: bool,
}

impl<'m, D, E> FilterResults<'m, D, E> {
    pub(crate) fn new(
        message: &'m Value,
        items: Vec<(Arc<MappingRecord>, BTreeSet<String>)>,
        options: ResultOptions<'_, D, E>,
    ) -> Self {
        Self {
            message,
            items: items.into_iter(),
            data_builder: options.data_builder,
            extra_builder: options.extra_builder,
            data_ignore_missing: options.data_ignore_missing,
            extra_ignore_missing: options.extra_ignore_missing,
        }
    }
}

impl<'m, D, E> Iterator for FilterResults<'m, D, E>
where
    D: ResultBuilder,
    E: ResultBuilder,
{
    type Item = FilterResult<D::Output, E::Output>;

    fn next(&mut self) -> Option<Self::Item> {
        let (record, filter_ids) = self.items.next()?;

        let outcome = self.extract(&record);
        Some(FilterResult {
            filter_ids,
            outcome,
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.items.size_hint()
    }
}

impl<'m, D, E> FilterResults<'m, D, E>
where
    D: ResultBuilder,
    E: ResultBuilder,
{
    fn extract(
        &self,
        record: &MappingRecord,
    ) -> Result<Extracted<D::Output, E::Output>, MappingError> {
        let data = path::extract_group(
            record.group(MappingGroup::Data),
            self.message,
            self.data_ignore_missing,
        )?;
        let extra = path::extract_group(
            record.group(MappingGroup::Extra),
            self.message,
            self.extra_ignore_missing,
        )?;

        Ok(Extracted {
            data: self.data_builder.build(data),
            extra: self.extra_builder.build(extra),
        })
    }
}
