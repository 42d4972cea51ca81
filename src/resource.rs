use crate::declare_resource_vector;

pub type ResourceId = String;
pub type ProcessId = String;
pub type Units = u32;

declare_resource_vector!(MaxDemand);
declare_resource_vector!(Allocation);
declare_resource_vector!(PendingRequest);
declare_resource_vector!(Demand);

#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub struct Resource {
    pub id: ResourceId,
    pub total: Units,
    pub available: Units,
}

impl Resource {
    pub fn new(id: ResourceId, total: Units) -> Self {
        Self {
            id,
            total,
            available: total,
        }
    }

    /// Units currently held by processes.
    pub fn held(&self) -> Units {
        self.total.saturating_sub(self.available)
    }
}

#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub struct Process {
    pub id: ProcessId,
    pub max_demand: MaxDemand,
    pub allocation: Allocation,
    pub request: PendingRequest,
}

impl Process {
    pub fn is_waiting(&self) -> bool {
        !self.request.is_zero()
    }
}

#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct ProcessDefinition {
    pub max_demand: Vec<(ResourceId, Units)>,
    pub request: Vec<(ResourceId, Units)>,
}

/// Resources and processes a store is built from. Entries are kept in
/// insertion order so duplicates can be reported at construction.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct SystemDefinition {
    pub(crate) resources: Vec<(ResourceId, Units)>,
    pub(crate) processes: Vec<(ProcessId, ProcessDefinition)>,
}

impl SystemDefinition {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resource(mut self, id: impl Into<ResourceId>, total: Units) -> Self {
        self.resources.push((id.into(), total));
        self
    }

    pub fn process<K, I>(self, id: impl Into<ProcessId>, max_demand: I) -> Self
    where
        K: Into<ResourceId>,
        I: IntoIterator<Item = (K, Units)>,
    {
        self.process_with_request(id, max_demand, Vec::<(ResourceId, Units)>::new())
    }

    /// Same as [`SystemDefinition::process`] with a starting pending request.
    pub fn process_with_request<K, I, L, J>(
        mut self,
        id: impl Into<ProcessId>,
        max_demand: I,
        request: J,
    ) -> Self
    where
        K: Into<ResourceId>,
        I: IntoIterator<Item = (K, Units)>,
        L: Into<ResourceId>,
        J: IntoIterator<Item = (L, Units)>,
    {
        let definition = ProcessDefinition {
            max_demand: max_demand
                .into_iter()
                .map(|(rid, units)| (rid.into(), units))
                .collect(),
            request: request
                .into_iter()
                .map(|(rid, units)| (rid.into(), units))
                .collect(),
        };
        self.processes.push((id.into(), definition));
        self
    }

    pub fn resources(&self) -> &[(ResourceId, Units)] {
        &self.resources
    }

    pub fn processes(&self) -> &[(ProcessId, ProcessDefinition)] {
        &self.processes
    }
}
