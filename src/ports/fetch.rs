use crate::error::FetchError;

pub trait TableFetcher: Clone + Send + Sync + 'static {
    type Fut<'a>: Future<Output = Result<String, FetchError>> + Send + 'a
    where
        Self: 'a;

    fn fetch<'a>(&'a self, url: &'a str) -> Self::Fut<'a>;
}
