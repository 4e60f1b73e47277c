//! Person/city reachability search over the `people` and `places` lookups.
//!
//! Every seed shares one [`SearchContext`], so the lookup cap holds across the
//! whole run and a name already in the result map is never queried again.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::info;

use crate::domain::error::Result;
use crate::domain::hub::SubmitTarget;
use crate::domain::llm_config::LLMConfig;
use crate::infrastructure::hub::{HubClient, PeopleDirectory};
use crate::infrastructure::llm_clients::SharedLLMClient;
use crate::infrastructure::response::require_completion;
use crate::infrastructure::storage::{ensure_dir, write_json, TaskLog};

pub const LOOKUP_LIMIT: usize = 40;

static NAME_LIST_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^([A-Z]+ ?)+$").unwrap());

const TARGET_CITY_PROMPT: &str = "Based on user's JSON, that represents merged city to person and person to city map, return the city that is associated with BARBARA the most. Return the city as string and nothing more.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Person,
    City,
}

impl EntityKind {
    fn related(self) -> Self {
        match self {
            EntityKind::Person => EntityKind::City,
            EntityKind::City => EntityKind::Person,
        }
    }
}

#[derive(Debug, Default)]
pub struct SearchContext {
    lookups: usize,
    results: BTreeMap<String, String>,
}

impl SearchContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookups(&self) -> usize {
        self.lookups
    }

    pub fn results(&self) -> &BTreeMap<String, String> {
        &self.results
    }

    pub fn limit_reached(&self) -> bool {
        self.lookups >= LOOKUP_LIMIT
    }
}

/// Names in an all-uppercase lookup result; anything else is free text.
pub fn related_names(message: &str) -> Option<Vec<String>> {
    if !NAME_LIST_PATTERN.is_match(message) {
        return None;
    }
    Some(
        message
            .split(' ')
            .filter(|name| !name.is_empty())
            .map(|name| name.to_string())
            .collect(),
    )
}

pub struct GraphSearch<'a> {
    directory: &'a (dyn PeopleDirectory + Send + Sync),
}

impl<'a> GraphSearch<'a> {
    pub fn new(directory: &'a (dyn PeopleDirectory + Send + Sync)) -> Self {
        Self { directory }
    }

    /// Depth-first expansion from `seed`, logging every step to `log`.
    pub async fn expand(
        &self,
        ctx: &mut SearchContext,
        kind: EntityKind,
        seed: &str,
        log: &TaskLog,
    ) -> Result<()> {
        let mut worklist = vec![(kind, seed.to_string())];

        while let Some((kind, name)) = worklist.pop() {
            if ctx.limit_reached() {
                log.append(&["LIMIT EXCEEDED".to_string()]).await?;
                return Ok(());
            }
            if ctx.results.contains_key(&name) {
                log.append(&[format!("{} DATA ALREADY FETCHED", name)])
                    .await?;
                continue;
            }

            let message = match kind {
                EntityKind::Person => self.directory.people(&name).await?,
                EntityKind::City => self.directory.places(&name).await?,
            };
            ctx.lookups += 1;
            ctx.results.insert(name.clone(), message.clone());

            log.append(&[
                format!("Fetching info about {}...", name),
                format!("{} - {}", name, message),
            ])
            .await?;

            if let Some(names) = related_names(&message) {
                let next = kind.related();
                worklist.extend(names.into_iter().rev().map(|n| (next, n)));
            }
        }

        Ok(())
    }
}

/// Seeds and the log file each one writes to.
const SEEDS: &[(EntityKind, &str, &str)] = &[
    (EntityKind::Person, "barbara", "barbara.txt"),
    (EntityKind::Person, "andrzej", "andrzej.txt"),
    (EntityKind::Person, "aleksander", "aleksander.txt"),
    (EntityKind::Person, "aleksander", "rafal.txt"),
    (EntityKind::City, "krakow", "krakow.txt"),
    (EntityKind::City, "warszawa", "warszawa.txt"),
];

pub struct LoopUseCase {
    hub: Arc<HubClient>,
    llm_client: SharedLLMClient,
    config: LLMConfig,
    logs_dir: PathBuf,
}

impl LoopUseCase {
    pub fn new(
        hub: Arc<HubClient>,
        llm_client: SharedLLMClient,
        config: LLMConfig,
        logs_dir: PathBuf,
    ) -> Self {
        Self {
            hub,
            llm_client,
            config,
            logs_dir,
        }
    }

    pub async fn execute(&self) -> Result<()> {
        ensure_dir(&self.logs_dir).await?;

        let search = GraphSearch::new(self.hub.as_ref());
        let mut ctx = SearchContext::new();
        for (kind, seed, log_file) in SEEDS {
            let log = TaskLog::new(self.logs_dir.join(log_file));
            search.expand(&mut ctx, *kind, seed, &log).await?;
        }
        info!(lookups = ctx.lookups(), names = ctx.results().len(), "Search finished");

        write_json(&self.logs_dir.join("result.json"), ctx.results()).await?;

        let completion = self
            .llm_client
            .generate(
                &self.config,
                TARGET_CITY_PROMPT,
                &serde_json::to_string(ctx.results())?,
            )
            .await?;
        let city = require_completion(completion, "City completion")?;
        info!(city = %city, "Completion");

        self.hub.submit("loop", city.trim(), SubmitTarget::Central).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeDirectory {
        people: HashMap<String, String>,
        places: HashMap<String, String>,
        queries: Mutex<Vec<String>>,
    }

    impl FakeDirectory {
        fn queries(&self) -> Vec<String> {
            self.queries.lock().unwrap().clone()
        }

        fn answer(&self, map: &HashMap<String, String>, name: &str) -> Result<String> {
            self.queries.lock().unwrap().push(name.to_string());
            Ok(map
                .get(name)
                .cloned()
                .unwrap_or_else(|| "[**RESTRICTED DATA**]".to_string()))
        }
    }

    #[async_trait]
    impl PeopleDirectory for FakeDirectory {
        async fn people(&self, name: &str) -> Result<String> {
            self.answer(&self.people, name)
        }

        async fn places(&self, name: &str) -> Result<String> {
            self.answer(&self.places, name)
        }
    }

    /// Every lookup reveals two names never seen before.
    struct EndlessDirectory {
        calls: Mutex<usize>,
    }

    impl EndlessDirectory {
        fn next(&self, prefix: &str) -> String {
            let mut calls = self.calls.lock().unwrap();
            *calls += 1;
            format!("{p}A{n} {p}B{n}", p = prefix, n = "X".repeat(*calls))
        }
    }

    #[async_trait]
    impl PeopleDirectory for EndlessDirectory {
        async fn people(&self, _name: &str) -> Result<String> {
            Ok(self.next("CITY"))
        }

        async fn places(&self, _name: &str) -> Result<String> {
            Ok(self.next("PERSON"))
        }
    }

    fn temp_log(name: &str) -> TaskLog {
        TaskLog::new(
            std::env::temp_dir()
                .join(format!("graph-search-{}", uuid::Uuid::new_v4()))
                .join(name),
        )
    }

    #[test]
    fn test_related_names() {
        assert_eq!(
            related_names("KRAKOW WARSZAWA"),
            Some(vec!["KRAKOW".to_string(), "WARSZAWA".to_string()])
        );
        assert_eq!(related_names("BARBARA"), Some(vec!["BARBARA".to_string()]));
        assert_eq!(related_names("[**RESTRICTED DATA**]"), None);
        assert_eq!(related_names("Kraków"), None);
        assert_eq!(related_names(""), None);
    }

    #[tokio::test]
    async fn test_expansion_alternates_kinds_and_skips_known_names() {
        let mut directory = FakeDirectory::default();
        directory
            .people
            .insert("barbara".into(), "KRAKOW WARSZAWA".into());
        directory.places.insert("KRAKOW".into(), "BARBARA ADAM".into());
        directory.places.insert("WARSZAWA".into(), "ADAM".into());
        directory.people.insert("ADAM".into(), "KRAKOW".into());
        directory.people.insert("BARBARA".into(), "KRAKOW".into());

        let log = temp_log("barbara.txt");
        let mut ctx = SearchContext::new();
        GraphSearch::new(&directory)
            .expand(&mut ctx, EntityKind::Person, "barbara", &log)
            .await
            .unwrap();

        assert_eq!(
            directory.queries(),
            vec!["barbara", "KRAKOW", "BARBARA", "ADAM", "WARSZAWA"]
        );
        assert_eq!(ctx.lookups(), 5);
        assert_eq!(ctx.results()["WARSZAWA"], "ADAM");

        let content = std::fs::read_to_string(log.path()).unwrap();
        assert!(content.starts_with("Fetching info about barbara...\nbarbara - KRAKOW WARSZAWA"));
        assert!(content.contains("KRAKOW DATA ALREADY FETCHED"));
    }

    #[tokio::test]
    async fn test_shared_context_never_requeries() {
        let mut directory = FakeDirectory::default();
        directory.people.insert("aleksander".into(), "LUBLIN".into());
        directory.places.insert("LUBLIN".into(), "[**RESTRICTED DATA**]".into());

        let search = GraphSearch::new(&directory);
        let mut ctx = SearchContext::new();
        search
            .expand(&mut ctx, EntityKind::Person, "aleksander", &temp_log("a.txt"))
            .await
            .unwrap();
        search
            .expand(&mut ctx, EntityKind::Person, "aleksander", &temp_log("rafal.txt"))
            .await
            .unwrap();

        assert_eq!(directory.queries(), vec!["aleksander", "LUBLIN"]);
        assert_eq!(ctx.lookups(), 2);
    }

    #[tokio::test]
    async fn test_lookup_cap_holds_across_seeds() {
        let directory = EndlessDirectory {
            calls: Mutex::new(0),
        };
        let search = GraphSearch::new(&directory);
        let mut ctx = SearchContext::new();
        let log = temp_log("endless.txt");

        search
            .expand(&mut ctx, EntityKind::Person, "barbara", &log)
            .await
            .unwrap();
        search
            .expand(&mut ctx, EntityKind::City, "krakow", &log)
            .await
            .unwrap();

        assert_eq!(ctx.lookups(), LOOKUP_LIMIT);
        assert_eq!(*directory.calls.lock().unwrap(), LOOKUP_LIMIT);
        assert_eq!(ctx.results().len(), LOOKUP_LIMIT);
        let content = std::fs::read_to_string(log.path()).unwrap();
        assert!(content.ends_with("LIMIT EXCEEDED"));
    }
}
