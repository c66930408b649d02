use crate::{
    navigation::QuerySpec,
    obs::sink::{self, EngineEvent},
};

///
/// WindowQuery
///
/// One window of a paginated result set. `page`/`page_size` address records
/// `page * page_size .. (page + 1) * page_size` under the query's filter.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct WindowQuery {
    pub spec: QuerySpec,
    pub page: u32,
    pub page_size: u32,
}

///
/// PageRequest
///
/// What an accepted page increment asks the collaborators to do: fetch
/// exactly one page, move the subscription to the cumulative window, and
/// record the new loaded-count in the view configuration.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PageRequest {
    /// The single page to read.
    pub fetch: WindowQuery,
    /// The cumulative window (all pages up to and including this one) the
    /// reconciler listens on, so earlier pages stay visible as later ones
    /// load.
    pub subscription: WindowQuery,
    /// New value for the view configuration's loaded-count.
    pub loaded_count: u32,
}

///
/// PaginationController
///
/// Decides when another page may be requested. At most one fetch is
/// outstanding at a time; once the window is exhausted, further requests are
/// ignored until a structural reset.
///

#[derive(Debug)]
pub struct PaginationController {
    page: u32,
    page_size: u32,
    exhausted: bool,
    in_flight: bool,
}

impl PaginationController {
    #[must_use]
    pub const fn new(page_size: u32) -> Self {
        Self {
            page: 0,
            page_size: if page_size == 0 { 1 } else { page_size },
            exhausted: false,
            in_flight: false,
        }
    }

    #[must_use]
    pub const fn page(&self) -> u32 {
        self.page
    }

    #[must_use]
    pub const fn page_size(&self) -> u32 {
        self.page_size
    }

    #[must_use]
    pub const fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    #[must_use]
    pub const fn is_in_flight(&self) -> bool {
        self.in_flight
    }

    /// Records accepted so far: the cumulative window target.
    #[must_use]
    pub const fn loaded_target(&self) -> u32 {
        self.page.saturating_mul(self.page_size)
    }

    /// Accept or refuse the next page request.
    ///
    /// Refused while a fetch is in flight or the window is exhausted. The
    /// caller is responsible for checking navigation validity first; an
    /// invalid workspace never reaches this point.
    pub fn request_next_page(&mut self, spec: &QuerySpec) -> Option<PageRequest> {
        if self.in_flight || self.exhausted {
            return None;
        }

        let request = PageRequest {
            fetch: WindowQuery {
                spec: spec.clone(),
                page: self.page,
                page_size: self.page_size,
            },
            subscription: WindowQuery {
                spec: spec.clone(),
                page: 0,
                page_size: (self.page + 1).saturating_mul(self.page_size),
            },
            loaded_count: (self.page + 1).saturating_mul(self.page_size),
        };

        sink::record(EngineEvent::FetchDispatched { page: self.page });
        self.in_flight = true;
        self.page += 1;

        Some(request)
    }

    /// Re-request a previously loaded cumulative window in one step, seeded
    /// from the persisted loaded-count, instead of re-paginating one page at
    /// a time.
    pub fn seed_from_loaded_count(&mut self, spec: &QuerySpec, loaded_count: u32) -> Option<PageRequest> {
        if loaded_count <= self.page_size || self.page > 0 {
            // Nothing beyond the first page was ever loaded; the normal
            // request path covers it.
            return self.request_next_page(spec);
        }

        let pages = loaded_count.div_ceil(self.page_size);
        let window = WindowQuery {
            spec: spec.clone(),
            page: 0,
            page_size: pages.saturating_mul(self.page_size),
        };

        sink::record(EngineEvent::FetchDispatched { page: 0 });
        self.in_flight = true;
        self.page = pages;

        Some(PageRequest {
            fetch: window.clone(),
            subscription: window,
            loaded_count: self.loaded_target(),
        })
    }

    /// Note an authoritative batch for the cumulative window.
    ///
    /// The in-flight flag clears, and the window is exhausted when the batch
    /// is smaller than the cumulative target: the server has fewer records
    /// than the accepted pages asked for.
    pub fn note_batch(&mut self, batch_len: usize) {
        self.in_flight = false;

        let expected = self.loaded_target();
        let batch_len = u32::try_from(batch_len).unwrap_or(u32::MAX);

        if !self.exhausted && batch_len < expected {
            self.exhausted = true;
            sink::record(EngineEvent::ExhaustionReached {
                batch_len,
                expected,
            });
        }
    }

    /// Structural reset: back to page zero, nothing in flight, nothing
    /// exhausted.
    pub const fn reset(&mut self) {
        self.page = 0;
        self.exhausted = false;
        self.in_flight = false;
    }
}
