use crate::types::{CollectionId, OrganizationId, ProjectId};

///
/// Workspace
///
/// The enclosing organization/project pair. A workspace is valid only when
/// both identifiers are present; while invalid, no fetch may be issued.
///

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Workspace {
    pub organization: Option<OrganizationId>,
    pub project: Option<ProjectId>,
}

impl Workspace {
    #[must_use]
    pub const fn new(organization: OrganizationId, project: ProjectId) -> Self {
        Self {
            organization: Some(organization),
            project: Some(project),
        }
    }

    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.organization.is_some() && self.project.is_some()
    }
}

///
/// QuerySpec
///
/// The structural filter a perspective is showing: which collections, plus an
/// optional fulltext needle. Equality is what "the query became different"
/// means for structural resets.
///

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct QuerySpec {
    pub collections: Vec<CollectionId>,
    pub fulltext: Option<String>,
}

impl QuerySpec {
    #[must_use]
    pub fn for_collection(collection: CollectionId) -> Self {
        Self {
            collections: vec![collection],
            fulltext: None,
        }
    }
}

///
/// NavigationChange
///
/// What applying a navigation update did to the perspective.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum NavigationChange {
    /// Query or workspace changed: all prior state is invalid.
    StructuralReset,
    Unchanged,
}

///
/// NavigationState
///
/// Tracks the current workspace + query and classifies incoming navigation
/// updates. The engine resets on every structural change and fetches only
/// while the navigation is valid.
///

#[derive(Debug, Default)]
pub struct NavigationState {
    workspace: Workspace,
    query: Option<QuerySpec>,
}

impl NavigationState {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            workspace: Workspace {
                organization: None,
                project: None,
            },
            query: None,
        }
    }

    #[must_use]
    pub const fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    #[must_use]
    pub const fn query(&self) -> Option<&QuerySpec> {
        self.query.as_ref()
    }

    /// Valid navigation: a complete workspace and a known query.
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.workspace.is_valid() && self.query.is_some()
    }

    /// Apply a navigation update, reporting whether it invalidated the
    /// perspective's prior state.
    pub fn apply(&mut self, workspace: Workspace, query: QuerySpec) -> NavigationChange {
        let changed = self.workspace != workspace || self.query.as_ref() != Some(&query);

        self.workspace = workspace;
        self.query = Some(query);

        if changed {
            NavigationChange::StructuralReset
        } else {
            NavigationChange::Unchanged
        }
    }
}
