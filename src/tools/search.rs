//! Web search tool backed by Google Custom Search, with a cache, a cooldown,
//! and a layered fallback so a result list is never empty.
//!
//! Lookup order: normalized-key cache, then the live API when both search
//! credentials are present, then a small hand-authored knowledge base matched
//! by substring, then generated encyclopedia/web/news links built from the
//! literal query. Every title and snippet is length-capped on the way out
//! regardless of which layer produced it.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{Tool, ToolContext};
use crate::conversation::ToolName;
use crate::memory::MemoryManager;

const MAX_QUERY_CHARS: usize = 200;
const MAX_TITLE_CHARS: usize = 150;
const MAX_SNIPPET_CHARS: usize = 300;
const MAX_RESULTS: u32 = 10;

/// Source label for knowledge-base fallback results.
pub const SOURCE_CONTEXTUAL: &str = "Contextual Search Results";
/// Source label for generated-link fallback results.
pub const SOURCE_MINIMAL: &str = "Minimal Fallback";
/// Source label for live API results.
pub const SOURCE_LIVE: &str = "Google Custom Search";

/// One search hit. Title and snippet are capped before this leaves the tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub title: String,
    pub link: String,
    pub snippet: String,
    pub display_link: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    pub query: String,
    pub results: Vec<SearchResult>,
    pub source: String,
    pub total_results: String,
    pub timestamp: String,
    pub cached: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

pub struct SearchTool {
    memory: Arc<MemoryManager>,
    client: reqwest::Client,
}

#[async_trait]
impl Tool for SearchTool {
    fn name(&self) -> ToolName {
        ToolName::GoogleSearch
    }

    fn description(&self) -> &str {
        "Search the web for information. Returns search results with titles, links, and snippets. Use for finding current information, documentation, or facts."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The search query"
                },
                "num_results": {
                    "type": "integer",
                    "description": "Number of results to return, 1-10 (default: 5)"
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> anyhow::Result<Value> {
        let query = args["query"]
            .as_str()
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .ok_or_else(|| anyhow::anyhow!("Missing 'query' argument"))?;
        let num_results = args["num_results"].as_u64().unwrap_or(5) as u32;

        let response = self.search(query, num_results, ctx).await;
        Ok(serde_json::to_value(response)?)
    }
}

impl SearchTool {
    pub fn new(memory: Arc<MemoryManager>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self { memory, client }
    }

    /// Run a search end to end: cache, cooldown, live call, fallback. This
    /// never fails and never returns an empty result list.
    pub async fn search(&self, query: &str, num_results: u32, ctx: &ToolContext) -> SearchResponse {
        let query: String = query.trim().chars().take(MAX_QUERY_CHARS).collect();
        let num_results = num_results.clamp(1, MAX_RESULTS);

        let key = format!("{}_{}", query.to_lowercase(), num_results);
        if let Some(mut hit) = self.memory.cache_get(&key).await {
            tracing::debug!(%query, "search cache hit");
            hit.cached = true;
            return hit;
        }

        // Cooldown delays rather than rejects; slots are handed out under the
        // rate-limit lock so bursts queue in arrival order.
        let delay = self.memory.acquire_search_slot().await;
        if !delay.is_zero() {
            tracing::debug!(%query, ?delay, "search cooldown");
            tokio::time::sleep(delay).await;
        }

        let response = match (ctx.search_key.as_deref(), ctx.search_cx.as_deref()) {
            (Some(api_key), Some(cx)) if !api_key.trim().is_empty() && !cx.trim().is_empty() => {
                match self.live_search(&query, num_results, api_key, cx).await {
                    Ok(response) => response,
                    Err(err) => {
                        tracing::warn!(%query, error = %err, "live search failed, using fallback");
                        fallback_search(&query, num_results)
                    }
                }
            }
            _ => fallback_search(&query, num_results),
        };

        self.memory.cache_put(key, response.clone()).await;
        response
    }

    async fn live_search(
        &self,
        query: &str,
        num_results: u32,
        api_key: &str,
        cx: &str,
    ) -> anyhow::Result<SearchResponse> {
        let url = format!(
            "https://www.googleapis.com/customsearch/v1?key={}&cx={}&q={}&num={}",
            urlencoding::encode(api_key),
            urlencoding::encode(cx),
            urlencoding::encode(query),
            num_results
        );

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("search API returned {}", status);
        }

        let body: CseResponse = response.json().await?;
        let results: Vec<SearchResult> = body
            .items
            .unwrap_or_default()
            .into_iter()
            .take(num_results as usize)
            .map(|item| cap_result(SearchResult {
                title: item.title.unwrap_or_default(),
                link: item.link.clone().unwrap_or_default(),
                snippet: item.snippet.unwrap_or_default(),
                display_link: item
                    .display_link
                    .or(item.link)
                    .unwrap_or_default(),
            }))
            .collect();

        if results.is_empty() {
            anyhow::bail!("search API returned no items");
        }

        let total_results = body
            .search_information
            .and_then(|i| i.total_results)
            .unwrap_or_else(|| results.len().to_string());

        Ok(SearchResponse {
            query: query.to_string(),
            results,
            source: SOURCE_LIVE.to_string(),
            total_results,
            timestamp: chrono::Utc::now().to_rfc3339(),
            cached: false,
            note: None,
        })
    }
}

#[derive(Debug, Deserialize)]
struct CseResponse {
    items: Option<Vec<CseItem>>,
    #[serde(rename = "searchInformation")]
    search_information: Option<CseSearchInformation>,
}

#[derive(Debug, Deserialize)]
struct CseItem {
    title: Option<String>,
    link: Option<String>,
    snippet: Option<String>,
    #[serde(rename = "displayLink")]
    display_link: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CseSearchInformation {
    #[serde(rename = "totalResults")]
    total_results: Option<String>,
}

fn cap_result(mut result: SearchResult) -> SearchResult {
    result.title = cap_chars(&result.title, MAX_TITLE_CHARS);
    result.snippet = cap_chars(&result.snippet, MAX_SNIPPET_CHARS);
    result
}

fn cap_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        text.chars().take(max).collect()
    }
}

/// Deterministic non-live search: knowledge base by substring, else generated
/// links parameterized by the literal query.
pub fn fallback_search(query: &str, num_results: u32) -> SearchResponse {
    let num = num_results.clamp(1, MAX_RESULTS) as usize;
    let lowered = query.to_lowercase();

    let (results, source, note) = match knowledge_base_results(&lowered) {
        Some(results) => (
            results,
            SOURCE_CONTEXTUAL,
            "Results synthesized from a built-in knowledge base; configure search credentials for live results.",
        ),
        None => (
            generated_links(query),
            SOURCE_MINIMAL,
            "Live search unavailable; generated reference links for the query.",
        ),
    };

    let results: Vec<SearchResult> = results.into_iter().take(num).map(cap_result).collect();

    SearchResponse {
        query: query.to_string(),
        total_results: results.len().to_string(),
        results,
        source: source.to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        cached: false,
        note: Some(note.to_string()),
    }
}

/// Hand-authored entries for well-known topics, matched by substring.
fn knowledge_base_results(lowered_query: &str) -> Option<Vec<SearchResult>> {
    let topics: &[(&str, &[(&str, &str, &str)])] = &[
        (
            "ibm",
            &[
                (
                    "IBM - International Business Machines",
                    "https://www.ibm.com",
                    "IBM is a multinational technology corporation offering hardware, software, cloud computing, and AI services, headquartered in Armonk, New York.",
                ),
                (
                    "IBM - Wikipedia",
                    "https://en.wikipedia.org/wiki/IBM",
                    "International Business Machines Corporation, founded in 1911, is one of the world's oldest and largest technology companies.",
                ),
                (
                    "IBM Research",
                    "https://research.ibm.com",
                    "IBM Research is one of the largest industrial research organizations, known for work on mainframes, quantum computing, and AI.",
                ),
            ],
        ),
        (
            "rust",
            &[
                (
                    "Rust Programming Language",
                    "https://www.rust-lang.org",
                    "Rust is a systems programming language focused on safety, speed, and concurrency, with memory safety guaranteed without garbage collection.",
                ),
                (
                    "The Rust Book",
                    "https://doc.rust-lang.org/book/",
                    "The official Rust book covers ownership, borrowing, traits, and the rest of the language from first principles.",
                ),
            ],
        ),
        (
            "javascript",
            &[
                (
                    "JavaScript | MDN",
                    "https://developer.mozilla.org/en-US/docs/Web/JavaScript",
                    "JavaScript is a lightweight interpreted programming language with first-class functions, best known as the scripting language of the Web.",
                ),
                (
                    "ECMAScript Language Specification",
                    "https://tc39.es/ecma262/",
                    "The ECMAScript specification defines the JavaScript language as standardized by TC39.",
                ),
            ],
        ),
        (
            "machine learning",
            &[
                (
                    "Machine learning - Wikipedia",
                    "https://en.wikipedia.org/wiki/Machine_learning",
                    "Machine learning is a field of artificial intelligence concerned with algorithms that improve automatically through experience and data.",
                ),
                (
                    "Google Machine Learning Crash Course",
                    "https://developers.google.com/machine-learning/crash-course",
                    "A self-study guide to machine learning fundamentals with video lectures and hands-on exercises.",
                ),
            ],
        ),
        (
            "climate",
            &[
                (
                    "Climate Change | United Nations",
                    "https://www.un.org/en/climatechange",
                    "The UN portal on climate change: science, impacts, and international action including the Paris Agreement.",
                ),
                (
                    "NASA Climate",
                    "https://climate.nasa.gov",
                    "NASA's portal for climate change evidence, causes, effects, and vital signs of the planet.",
                ),
            ],
        ),
    ];

    for (topic, entries) in topics {
        if lowered_query.contains(topic) {
            let results = entries
                .iter()
                .map(|(title, link, snippet)| SearchResult {
                    title: (*title).to_string(),
                    link: (*link).to_string(),
                    snippet: (*snippet).to_string(),
                    display_link: display_link_of(link),
                })
                .collect();
            return Some(results);
        }
    }
    None
}

/// Generic encyclopedia/web/news links built from the literal query string.
fn generated_links(query: &str) -> Vec<SearchResult> {
    let encoded = urlencoding::encode(query).into_owned();
    vec![
        SearchResult {
            title: format!("{} - Wikipedia search", query),
            link: format!(
                "https://en.wikipedia.org/wiki/Special:Search?search={}",
                encoded
            ),
            snippet: format!(
                "Encyclopedia articles related to \"{}\" on Wikipedia.",
                query
            ),
            display_link: "en.wikipedia.org".to_string(),
        },
        SearchResult {
            title: format!("Web results for \"{}\"", query),
            link: format!("https://duckduckgo.com/?q={}", encoded),
            snippet: format!("General web search results for \"{}\".", query),
            display_link: "duckduckgo.com".to_string(),
        },
        SearchResult {
            title: format!("News coverage of \"{}\"", query),
            link: format!("https://news.google.com/search?q={}", encoded),
            snippet: format!("Recent news articles mentioning \"{}\".", query),
            display_link: "news.google.com".to_string(),
        },
    ]
}

fn display_link_of(url: &str) -> String {
    url.trim_start_matches("https://")
        .trim_start_matches("http://")
        .split('/')
        .next()
        .unwrap_or(url)
        .to_string()
}
