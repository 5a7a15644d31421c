mod article;
mod remote;
mod tag;

pub use article::{Article, NewArticle};
pub use remote::{ArticlePage, RemoteArticle, RemoteTag};
pub use tag::{NewTag, Tag};
