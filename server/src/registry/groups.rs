use shared_types::{Group, LabelSet};
use std::sync::Arc;
use tracing::{debug, info, instrument};

use super::error::{RegistryError, RegistryResult};
use super::{decode_json, encode_json, keys, require_non_empty};
use crate::storage::KvBackend;

/// Groups plus an index of their label-sets.
///
/// The group document lives at `group/<id>/<version>`; every attached
/// label-set is also written beneath it at its canonical label key, so an
/// exact label lookup is a single prefix scan.
#[derive(Clone)]
pub struct GroupIndex {
    backend: Arc<dyn KvBackend>,
}

impl GroupIndex {
    pub fn new(backend: Arc<dyn KvBackend>) -> Self {
        Self { backend }
    }

    fn validate_label_sets(label_sets: &[LabelSet]) -> RegistryResult<()> {
        if label_sets.is_empty() {
            return Err(RegistryError::Malformed(
                "configs must not be empty".to_string(),
            ));
        }
        if label_sets.iter().any(LabelSet::is_empty) {
            return Err(RegistryError::Malformed(
                "label-sets must not be empty".to_string(),
            ));
        }
        if label_sets.iter().flat_map(LabelSet::keys).any(String::is_empty) {
            return Err(RegistryError::Malformed(
                "label keys must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    fn validate(group: &Group) -> RegistryResult<()> {
        require_non_empty("version", &group.version)?;
        Self::validate_label_sets(&group.configs)
    }

    async fn write_document(&self, group: &Group) -> RegistryResult<()> {
        let key = keys::group_key(&group.id, &group.version);
        self.backend.put(&key, encode_json(&key, group)?).await?;
        Ok(())
    }

    /// Stores a new group under a fresh id and indexes its label-sets.
    #[instrument(skip(self, group), fields(version = %group.version))]
    pub async fn create_group(&self, mut group: Group) -> RegistryResult<Group> {
        Self::validate(&group)?;

        group.id = keys::new_id();
        self.write_document(&group).await?;
        self.attach_labels(&group.configs, &group.id, &group.version)
            .await?;

        info!(id = %group.id, labels = group.configs.len(), "created group");
        Ok(group)
    }

    #[instrument(skip(self))]
    pub async fn get_group(&self, id: &str, version: &str) -> RegistryResult<Group> {
        let key = keys::group_key(id, version);
        match self.backend.get(&key).await? {
            Some(raw) => decode_json(&key, &raw),
            None => Err(RegistryError::NotFound(format!("group {id}@{version}"))),
        }
    }

    /// Every stored version of group `id`, in backend key order.
    #[instrument(skip(self))]
    pub async fn list_group_versions(&self, id: &str) -> RegistryResult<Vec<Group>> {
        let entries = self.backend.list(&keys::group_prefix(id)).await?;

        entries
            .iter()
            .filter(|(key, _)| keys::parse_version_key(key, keys::GROUP_ROOT).is_some())
            .map(|(key, raw)| decode_json(key, raw))
            .collect()
    }

    /// Stores another version of an existing group and indexes its label-sets.
    #[instrument(skip(self, group), fields(id = %group.id, version = %group.version))]
    pub async fn put_new_group_version(&self, group: Group) -> RegistryResult<Group> {
        require_non_empty("id", &group.id)?;
        Self::validate(&group)?;

        match self.get_group(&group.id, &group.version).await {
            Ok(_) => {
                return Err(RegistryError::AlreadyExists(format!(
                    "group {}@{}",
                    group.id, group.version
                )));
            }
            Err(RegistryError::NotFound(_)) => {}
            Err(e) => return Err(e),
        }

        self.write_document(&group).await?;
        self.attach_labels(&group.configs, &group.id, &group.version)
            .await?;

        info!("stored new group version");
        Ok(group)
    }

    /// Removes a group version together with every label-set indexed under it.
    #[instrument(skip(self))]
    pub async fn delete_group_version(&self, id: &str, version: &str) -> RegistryResult<usize> {
        let key = keys::group_key(id, version);
        if self.backend.get(&key).await?.is_none() {
            return Err(RegistryError::NotFound(format!("group {id}@{version}")));
        }

        let deleted = self.backend.delete_tree(&key).await?;
        info!(deleted, "deleted group version");
        Ok(deleted)
    }

    /// Indexes `label_sets` under an existing group version.
    ///
    /// Each label-set gets a fresh index segment, so equal label-sets never
    /// overwrite each other. Writes already made stay in place if a later one
    /// fails.
    #[instrument(skip(self, label_sets), fields(count = label_sets.len()))]
    pub async fn attach_labels(
        &self,
        label_sets: &[LabelSet],
        id: &str,
        version: &str,
    ) -> RegistryResult<()> {
        if self
            .backend
            .get(&keys::group_key(id, version))
            .await?
            .is_none()
        {
            return Err(RegistryError::NotFound(format!("group {id}@{version}")));
        }

        if label_sets
            .iter()
            .any(|labels| labels.is_empty() || labels.keys().any(String::is_empty))
        {
            return Err(RegistryError::Malformed(
                "label-sets and label keys must not be empty".to_string(),
            ));
        }

        for labels in label_sets {
            let key = keys::label_key(id, version, labels, &keys::new_id());
            debug!(%key, "indexing label-set");
            self.backend.put(&key, encode_json(&key, labels)?).await?;
        }
        Ok(())
    }

    /// Appends label-sets to a stored group version.
    ///
    /// The whole group document is rewritten with the extended list, then the
    /// new label-sets are indexed. Returns the full updated list.
    #[instrument(skip(self, label_sets), fields(count = label_sets.len()))]
    pub async fn add_labels_to_group(
        &self,
        label_sets: Vec<LabelSet>,
        id: &str,
        version: &str,
    ) -> RegistryResult<Vec<LabelSet>> {
        Self::validate_label_sets(&label_sets)?;

        let mut group = self.get_group(id, version).await?;
        group.configs.extend(label_sets.iter().cloned());
        self.write_document(&group).await?;
        self.attach_labels(&label_sets, id, version).await?;

        info!(total = group.configs.len(), "added labels to group");
        Ok(group.configs)
    }

    /// Label-sets of a group version exactly equal to `labels`.
    #[instrument(skip(self))]
    pub async fn find_by_labels(
        &self,
        id: &str,
        version: &str,
        labels: &LabelSet,
    ) -> RegistryResult<Vec<LabelSet>> {
        let prefix = keys::label_prefix(id, version, labels);
        let entries = self.backend.list(&prefix).await?;
        debug!(%prefix, matches = entries.len(), "label lookup");

        entries
            .iter()
            .map(|(key, raw)| decode_json(key, raw))
            .collect()
    }

    /// Label-sets matching a `k1=v1&k2=v2` query.
    ///
    /// Pair order in the query does not matter, but the match is exact: a
    /// query naming a subset of a label-set's pairs does not find it.
    pub async fn find_by_label(
        &self,
        id: &str,
        version: &str,
        query: &str,
    ) -> RegistryResult<Vec<LabelSet>> {
        let labels = keys::parse_label_query(query)
            .ok_or_else(|| RegistryError::Malformed(format!("invalid label query: {query}")))?;
        self.find_by_labels(id, version, &labels).await
    }
}
