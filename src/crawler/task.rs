//! Units of work flowing through the task queue

use crate::tracker::IssueRef;

/// One issue to fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTask {
    pub issue: IssueRef,

    /// Hops from the seed that led here (0 for seeds)
    pub depth: u32,

    /// 1-based search rank, present only on seed tasks
    pub crawl_order: Option<u32>,
}

impl FetchTask {
    /// A seed task taken from search results
    pub fn seed(issue: IssueRef, crawl_order: u32) -> Self {
        Self {
            issue,
            depth: 0,
            crawl_order: Some(crawl_order),
        }
    }

    /// A task discovered as related to a task at `parent_depth`
    pub fn related(issue: IssueRef, parent_depth: u32) -> Self {
        Self {
            issue,
            depth: parent_depth + 1,
            crawl_order: None,
        }
    }

    pub fn issue_id(&self) -> &str {
        &self.issue.id
    }

    pub fn is_seed(&self) -> bool {
        self.crawl_order.is_some()
    }
}
