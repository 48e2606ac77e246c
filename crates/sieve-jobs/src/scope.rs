//! Scope store: sources, profiles, the master graph cache and saved items.
//!
//! Every mutator re-reads the record it changes immediately before writing,
//! so concurrent processes see last-writer-wins at the record level.

use chrono::Utc;
use tracing::{debug, info};

use sieve_core::defaults::{MANUAL_TAG_BONUS, MASTER_MANUAL_TAG_WEIGHT};
use sieve_core::{
    flatten_scope, normalize_tag, rank_source_pairs, source_id_for, Channel, Descriptor,
    DescriptorRepository, Error, MasterGraph, MasterGraphRepository, Profile, ProfileRepository,
    ProfileUpdate, RecommendationItem, Result, SavedRecommendation, SavedRecommendationRepository,
    ScopeSelector, Source, SourceMeta, SourcePairSimilarity, SourceRepository, Stats, SubmitReceipt,
    TagGraph, TagSignals,
};
use sieve_db::Database;

/// Trim, lower-case and de-duplicate tags, keeping first-seen order.
pub fn normalize_tag_list(tags: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(tags.len());
    for tag in tags.iter().filter_map(|t| normalize_tag(t)) {
        if !out.contains(&tag) {
            out.push(tag);
        }
    }
    out
}

/// Sum of the given sources plus the manual-tag keyword bonus.
fn profile_graph(sources: &[Source], profile: &Profile) -> TagGraph {
    let mut graph = flatten_scope(sources, |s| &s.graph, |s| profile.source_ids.contains(&s.id));
    if !profile.manual_tags.is_empty() {
        let mut bonus = TagSignals::new();
        bonus.push(Channel::Keywords, profile.manual_tags.iter().cloned());
        graph.merge_signals_weighted(&bonus, MANUAL_TAG_BONUS);
    }
    graph
}

#[derive(Clone)]
pub struct ScopeStore {
    db: Database,
}

impl ScopeStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    // =========================================================================
    // SOURCES
    // =========================================================================

    /// Store a descriptor batch for a source, creating the source if needed.
    ///
    /// Descriptors already stored under the same identity are not counted
    /// again. No analysis is run.
    pub async fn submit_descriptors(
        &self,
        source_id: Option<&str>,
        meta: &SourceMeta,
        items: &[Descriptor],
    ) -> Result<SubmitReceipt> {
        let source_id = match source_id.map(str::trim).filter(|s| !s.is_empty()) {
            Some(id) => id.to_string(),
            None if meta.name.trim().is_empty() && meta.url.trim().is_empty() => {
                return Err(Error::InvalidInput(
                    "source needs an id, a name or a url".to_string(),
                ))
            }
            None => source_id_for(meta),
        };

        self.db.sources.upsert(&source_id, meta).await?;
        let accepted = self.db.descriptors.insert_batch(&source_id, items).await?;
        let item_count = self.db.descriptors.count_for_source(&source_id).await?;
        self.db.sources.set_item_count(&source_id, item_count).await?;

        info!(
            subsystem = "jobs",
            component = "scope",
            op = "submit_descriptors",
            source_id = %source_id,
            submitted = items.len(),
            accepted,
            item_count,
            "Stored descriptor batch"
        );

        Ok(SubmitReceipt {
            source_id,
            accepted,
            item_count,
        })
    }

    pub async fn list_sources(&self) -> Result<Vec<Source>> {
        self.db.sources.list().await
    }

    pub async fn get_source(&self, id: &str) -> Result<Source> {
        self.db
            .sources
            .get(id)
            .await?
            .ok_or_else(|| Error::NoSuchSource(id.to_string()))
    }

    pub async fn list_descriptors(&self, source_id: &str) -> Result<Vec<Descriptor>> {
        self.get_source(source_id).await?;
        self.db.descriptors.list_for_source(source_id).await
    }

    pub async fn rename_source(&self, id: &str, label: &str) -> Result<Source> {
        let label = label.trim();
        if label.is_empty() {
            return Err(Error::InvalidInput("label must not be empty".to_string()));
        }
        if !self.db.sources.set_label(id, label).await? {
            return Err(Error::NoSuchSource(id.to_string()));
        }
        self.get_source(id).await
    }

    /// Toggle whether a source feeds the master graph, then rebuild it.
    pub async fn set_source_enabled(&self, id: &str, enabled: bool) -> Result<MasterGraph> {
        if !self.db.sources.set_enabled(id, enabled).await? {
            return Err(Error::NoSuchSource(id.to_string()));
        }
        self.rebuild_master(None).await
    }

    /// Delete a source and its descriptors, drop it from every profile and
    /// rebuild the master graph.
    pub async fn delete_source(&self, id: &str) -> Result<MasterGraph> {
        if !self.db.sources.delete(id).await? {
            return Err(Error::NoSuchSource(id.to_string()));
        }
        let profiles = self.db.profiles.remove_source_refs(id).await?;
        info!(
            subsystem = "jobs",
            component = "scope",
            op = "delete_source",
            source_id = %id,
            profiles_updated = profiles,
            "Deleted source"
        );
        self.rebuild_master(None).await
    }

    // =========================================================================
    // MASTER GRAPH
    // =========================================================================

    /// Recompute and store the master graph.
    ///
    /// With `source_ids`, exactly those sources are summed; otherwise every
    /// enabled source is.
    pub async fn rebuild_master(&self, source_ids: Option<&[String]>) -> Result<MasterGraph> {
        let sources = self.db.sources.list().await?;
        let included = |s: &Source| match source_ids {
            Some(ids) => ids.contains(&s.id),
            None => s.enabled,
        };

        let graph = flatten_scope(&sources, |s| &s.graph, included);
        let master = MasterGraph {
            graph,
            source_ids: sources
                .iter()
                .filter(|s| included(s))
                .map(|s| s.id.clone())
                .collect(),
            updated_at: Utc::now(),
        };
        self.db.master.put(&master).await?;

        debug!(
            subsystem = "jobs",
            component = "scope",
            op = "rebuild_master",
            source_count = master.source_ids.len(),
            tag_count = master.graph.tag_count(),
            "Rebuilt master graph"
        );
        Ok(master)
    }

    /// The cached master graph, building it on first use.
    pub async fn master_graph(&self) -> Result<MasterGraph> {
        match self.db.master.get().await? {
            Some(master) => Ok(master),
            None => self.rebuild_master(None).await,
        }
    }

    /// Insert a tag directly into the cached master graph.
    ///
    /// This bypasses the derived-only rule and is lost on the next rebuild.
    pub async fn add_master_tag(
        &self,
        channel: Option<Channel>,
        tag: &str,
        weight: Option<u64>,
    ) -> Result<MasterGraph> {
        let channel = channel.unwrap_or(Channel::Keywords);
        let weight = weight.unwrap_or(MASTER_MANUAL_TAG_WEIGHT);

        let mut master = self.master_graph().await?;
        let tag = master
            .graph
            .set_tag(channel, tag, weight)
            .ok_or_else(|| Error::InvalidInput("tag must not be empty".to_string()))?;
        master.updated_at = Utc::now();
        self.db.master.put(&master).await?;

        info!(
            subsystem = "jobs",
            component = "scope",
            op = "add_master_tag",
            channel = %channel,
            tag = %tag,
            weight,
            "Manual tag written directly to master graph"
        );
        Ok(master)
    }

    /// Remove a tag from every channel of the cached master graph.
    pub async fn remove_master_tag(&self, tag: &str) -> Result<MasterGraph> {
        let mut master = self.master_graph().await?;
        let removed = master.graph.remove_tag(tag);
        if removed {
            master.updated_at = Utc::now();
            self.db.master.put(&master).await?;
        }

        info!(
            subsystem = "jobs",
            component = "scope",
            op = "remove_master_tag",
            tag = %tag,
            removed,
            "Manual tag removed directly from master graph"
        );
        Ok(master)
    }

    /// Graph for a generation scope.
    ///
    /// A profile flattens its own sources plus manual tags. The master scope
    /// uses an explicit source subset when given (without touching the
    /// cache), else the cached master graph.
    pub async fn flatten_scope(&self, selector: &ScopeSelector) -> Result<TagGraph> {
        if let Some(profile_id) = selector.profile_id.as_deref().filter(|p| !p.is_empty()) {
            return self.flatten_profile(profile_id).await;
        }
        match selector.source_ids.as_deref() {
            Some(ids) => {
                let sources = self.db.sources.list().await?;
                Ok(flatten_scope(&sources, |s| &s.graph, |s| ids.contains(&s.id)))
            }
            None => Ok(self.master_graph().await?.graph),
        }
    }

    // =========================================================================
    // PROFILES
    // =========================================================================

    pub async fn create_profile(
        &self,
        name: &str,
        source_ids: Vec<String>,
        manual_tags: &[String],
    ) -> Result<Profile> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::InvalidInput("profile name must not be empty".to_string()));
        }
        let profile = Profile::new(name.to_string(), source_ids, normalize_tag_list(manual_tags));
        self.db.profiles.insert(&profile).await?;

        info!(
            subsystem = "jobs",
            component = "scope",
            op = "create_profile",
            profile_id = %profile.id,
            source_count = profile.source_ids.len(),
            "Created profile"
        );
        Ok(profile)
    }

    pub async fn get_profile(&self, id: &str) -> Result<Profile> {
        self.db
            .profiles
            .get(id)
            .await?
            .ok_or_else(|| Error::ProfileNotFound(id.to_string()))
    }

    pub async fn list_profiles(&self) -> Result<Vec<Profile>> {
        self.db.profiles.list().await
    }

    pub async fn update_profile(&self, id: &str, update: ProfileUpdate) -> Result<Profile> {
        let update = ProfileUpdate {
            name: match update.name.as_deref().map(str::trim) {
                Some("") => {
                    return Err(Error::InvalidInput("profile name must not be empty".to_string()))
                }
                other => other.map(str::to_string),
            },
            source_ids: update.source_ids,
            manual_tags: update.manual_tags.as_deref().map(normalize_tag_list),
        };
        self.db.profiles.update(id, &update).await
    }

    pub async fn delete_profile(&self, id: &str) -> Result<()> {
        if !self.db.profiles.delete(id).await? {
            return Err(Error::ProfileNotFound(id.to_string()));
        }
        info!(
            subsystem = "jobs",
            component = "scope",
            op = "delete_profile",
            profile_id = %id,
            "Deleted profile"
        );
        Ok(())
    }

    pub async fn add_manual_tag(&self, profile_id: &str, tag: &str) -> Result<Profile> {
        let tag = normalize_tag(tag)
            .ok_or_else(|| Error::InvalidInput("tag must not be empty".to_string()))?;
        let profile = self.get_profile(profile_id).await?;
        if profile.manual_tags.contains(&tag) {
            return Ok(profile);
        }
        let mut tags = profile.manual_tags;
        tags.push(tag);
        self.set_manual_tags(profile_id, tags).await
    }

    pub async fn remove_manual_tag(&self, profile_id: &str, tag: &str) -> Result<Profile> {
        let profile = self.get_profile(profile_id).await?;
        let Some(tag) = normalize_tag(tag) else {
            return Ok(profile);
        };
        let tags: Vec<String> = profile
            .manual_tags
            .into_iter()
            .filter(|t| *t != tag)
            .collect();
        self.set_manual_tags(profile_id, tags).await
    }

    async fn set_manual_tags(&self, profile_id: &str, tags: Vec<String>) -> Result<Profile> {
        self.db
            .profiles
            .update(
                profile_id,
                &ProfileUpdate {
                    manual_tags: Some(tags),
                    ..Default::default()
                },
            )
            .await
    }

    /// Flatten a profile: its sources summed, plus the keyword bonus for
    /// each manual tag.
    pub async fn flatten_profile(&self, profile_id: &str) -> Result<TagGraph> {
        let profile = self.get_profile(profile_id).await?;
        let sources = self.db.sources.list().await?;
        Ok(profile_graph(&sources, &profile))
    }

    /// Pairs of the profile's sources ranked by tag overlap.
    pub async fn profile_similarities(&self, profile_id: &str) -> Result<Vec<SourcePairSimilarity>> {
        let profile = self.get_profile(profile_id).await?;
        let sources: Vec<Source> = self
            .db
            .sources
            .list()
            .await?
            .into_iter()
            .filter(|s| profile.source_ids.contains(&s.id))
            .collect();
        Ok(rank_source_pairs(&sources))
    }

    // =========================================================================
    // SAVED RECOMMENDATIONS
    // =========================================================================

    pub async fn save_recommendation(&self, item: RecommendationItem) -> Result<SavedRecommendation> {
        if item.name.trim().is_empty() {
            return Err(Error::InvalidInput("recommendation needs a name".to_string()));
        }
        let saved = SavedRecommendation {
            item,
            saved_at: Utc::now(),
        };
        self.db.saved.save(&saved).await?;
        Ok(saved)
    }

    pub async fn delete_saved(&self, id: &str) -> Result<()> {
        if !self.db.saved.delete(id).await? {
            return Err(Error::NotFound(format!("saved recommendation {}", id)));
        }
        Ok(())
    }

    pub async fn list_saved(&self, profile_id: Option<&str>) -> Result<Vec<SavedRecommendation>> {
        self.db.saved.list(profile_id).await
    }

    // =========================================================================
    // HOUSEKEEPING
    // =========================================================================

    pub async fn stats(&self) -> Result<Stats> {
        self.db.stats().await
    }

    pub async fn clear_all(&self) -> Result<()> {
        self.db.clear_all().await
    }
}
