use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use qa_core::{Error, Result, SearchHit, Thread};
use tokio::sync::RwLock;
use tracing::{info, instrument};

use crate::markdown::markdown_to_text;

/// 检索协作者：按排名返回候选，再逐个补全帖子内容
#[async_trait]
pub trait ThreadSource: Send + Sync {
    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<SearchHit>>;
    async fn fetch_thread(&self, id: &str) -> Result<Option<Thread>>;
}

/// 并发拉取全部命中，按原排名顺序返回，找不到的帖子直接丢弃
pub async fn fetch_threads(source: &dyn ThreadSource, hits: &[SearchHit]) -> Result<Vec<Thread>> {
    let fetched = join_all(hits.iter().map(|hit| source.fetch_thread(&hit.id))).await;
    let mut threads = Vec::with_capacity(fetched.len());
    for result in fetched {
        if let Some(thread) = result? {
            threads.push(thread);
        }
    }
    Ok(threads)
}

/// 基于内存的帖子存储
#[derive(Default, Clone)]
pub struct MemoryThreadStore {
    threads: Arc<RwLock<Vec<Thread>>>,
}

impl MemoryThreadStore {
    pub fn new(threads: Vec<Thread>) -> Self {
        Self {
            threads: Arc::new(RwLock::new(threads)),
        }
    }

    /// 从 JSON 数组文件加载种子数据
    pub async fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| Error::Storage {
                operation: format!("read {}", path.display()),
                message: e.to_string(),
            })?;
        let threads: Vec<Thread> = serde_json::from_str(&raw)?;
        info!(count = threads.len(), path = %path.display(), "loaded seed threads");
        Ok(Self::new(threads))
    }

    /// 插入或按 id 覆盖
    pub async fn insert(&self, thread: Thread) {
        let mut threads = self.threads.write().await;
        match threads.iter_mut().find(|t| t.id == thread.id) {
            Some(existing) => *existing = thread,
            None => threads.push(thread),
        }
    }

    pub async fn len(&self) -> usize {
        self.threads.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.threads.read().await.is_empty()
    }
}

fn plain_body(thread: &Thread) -> String {
    match thread.body_text.as_deref() {
        Some(text) if !text.is_empty() => text.to_string(),
        _ => markdown_to_text(&thread.body_md),
    }
}

#[async_trait]
impl ThreadSource for MemoryThreadStore {
    /// 标题或正文大小写不敏感包含查询串；按创建时间从新到旧
    #[instrument(skip(self))]
    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<SearchHit>> {
        let needle = query.to_lowercase();
        let threads = self.threads.read().await;
        let mut matched: Vec<&Thread> = threads
            .iter()
            .filter(|t| {
                t.title.to_lowercase().contains(&needle)
                    || plain_body(t).to_lowercase().contains(&needle)
            })
            .collect();
        // None 排在最后
        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(matched
            .into_iter()
            .take(top_k)
            .map(|t| SearchHit {
                id: t.id.clone(),
                title: Some(t.title.clone()),
            })
            .collect())
    }

    async fn fetch_thread(&self, id: &str) -> Result<Option<Thread>> {
        let threads = self.threads.read().await;
        Ok(threads.iter().find(|t| t.id == id).map(|t| {
            let mut thread = t.clone();
            thread.answers.sort_by(|a, b| a.created_at.cmp(&b.created_at));
            thread
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use qa_core::Reply;

    fn thread(id: &str, title: &str, body: &str, day: u32) -> Thread {
        Thread {
            id: id.into(),
            title: title.into(),
            body_md: body.into(),
            created_at: Some(Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap()),
            ..Default::default()
        }
    }

    fn store() -> MemoryThreadStore {
        MemoryThreadStore::new(vec![
            thread("old", "Demo setup", "how to **start**", 1),
            thread("new", "Other", "a DEMO body", 3),
            thread("none", "Unrelated", "nothing", 2),
        ])
    }

    #[tokio::test]
    async fn test_search_case_insensitive_newest_first() {
        let hits = store().search("demo", 10).await.unwrap();
        let ids: Vec<&str> = hits.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["new", "old"]);

        let hits = store().search("demo", 1).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].title.as_deref(), Some("Other"));
    }

    #[tokio::test]
    async fn test_search_matches_plain_text_not_markup() {
        let hits = store().search("how to start", 5).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "old");
    }

    #[tokio::test]
    async fn test_fetch_orders_replies_oldest_first() {
        let store = MemoryThreadStore::default();
        let mut t = thread("t", "T", "b", 1);
        t.answers = vec![
            Reply {
                id: "late".into(),
                created_at: Some(Utc.with_ymd_and_hms(2024, 2, 2, 0, 0, 0).unwrap()),
                ..Default::default()
            },
            Reply {
                id: "early".into(),
                created_at: Some(Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap()),
                ..Default::default()
            },
        ];
        store.insert(t).await;
        let fetched = store.fetch_thread("t").await.unwrap().unwrap();
        assert_eq!(fetched.answers[0].id, "early");
        assert!(store.fetch_thread("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_fetch_threads_keeps_rank_and_drops_missing() {
        let store = store();
        let hits = vec![
            SearchHit { id: "none".into(), title: None },
            SearchHit { id: "ghost".into(), title: None },
            SearchHit { id: "old".into(), title: None },
        ];
        let threads = fetch_threads(&store, &hits).await.unwrap();
        let ids: Vec<&str> = threads.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["none", "old"]);
    }

    #[tokio::test]
    async fn test_insert_replaces_by_id() {
        let store = store();
        store.insert(thread("old", "Renamed", "x", 1)).await;
        assert_eq!(store.len().await, 3);
        let t = store.fetch_thread("old").await.unwrap().unwrap();
        assert_eq!(t.title, "Renamed");
    }

    /// 排名越靠前拉取越慢，完成顺序与排名相反
    struct SlowFetchSource {
        ranked: Vec<&'static str>,
        completed: std::sync::Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ThreadSource for SlowFetchSource {
        async fn search(&self, _query: &str, _top_k: usize) -> Result<Vec<SearchHit>> {
            Ok(Vec::new())
        }

        async fn fetch_thread(&self, id: &str) -> Result<Option<Thread>> {
            let rank = self.ranked.iter().position(|r| *r == id).unwrap_or(0);
            let delay = (self.ranked.len() - rank) as u64 * 20;
            tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
            self.completed.lock().unwrap().push(id.to_string());
            Ok(Some(thread(id, id, "", 1)))
        }
    }

    #[tokio::test]
    async fn test_fetch_threads_out_of_order_completion_keeps_rank() {
        let source = SlowFetchSource {
            ranked: vec!["first", "second", "third"],
            completed: std::sync::Mutex::new(Vec::new()),
        };
        let hits: Vec<SearchHit> = source
            .ranked
            .iter()
            .map(|id| SearchHit {
                id: id.to_string(),
                title: None,
            })
            .collect();
        let threads = fetch_threads(&source, &hits).await.unwrap();
        let ids: Vec<&str> = threads.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["first", "second", "third"]);
        assert_eq!(
            *source.completed.lock().unwrap(),
            vec!["third".to_string(), "second".to_string(), "first".to_string()]
        );
    }
}
