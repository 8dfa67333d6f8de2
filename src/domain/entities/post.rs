use crate::helper::error_chain_fmt;
use serde::{Deserialize, Serialize};

/// A social-media post, as handed over by the content-fetch client.
///
/// Serialized as a flat record: `{title, selftext, permalink}` and exactly one of
/// `image_url` or `url`, depending on whether the source flagged the post as media.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(try_from = "RawPost", into = "RawPost")]
pub struct Post {
    pub title: String,
    pub selftext: String,
    pub permalink: String,
    pub link: PostLink,
}

/// Where the post points to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostLink {
    /// The source gave a media hint: the URL is expected to be an image
    ImageUrl(String),
    /// Any other outbound link, never fetched
    Url(String),
}

impl Post {
    pub fn try_new(
        title: impl Into<String>,
        selftext: impl Into<String>,
        permalink: impl Into<String>,
        link: PostLink,
    ) -> Result<Self, PostError> {
        let title = title.into();
        let permalink = permalink.into();

        if title.trim().is_empty() {
            return Err(PostError::EmptyTitle);
        }
        if permalink.trim().is_empty() {
            return Err(PostError::EmptyPermalink);
        }

        Ok(Self {
            title,
            selftext: selftext.into(),
            permalink,
            link,
        })
    }

    /// The image to embed, if any.
    ///
    /// An empty `image_url` is treated as no image at all.
    pub fn image_url(&self) -> Option<&str> {
        match &self.link {
            PostLink::ImageUrl(url) if !url.trim().is_empty() => Some(url),
            _ => None,
        }
    }

    /// The body text to embed, if it carries anything besides whitespace
    pub fn embeddable_selftext(&self) -> Option<&str> {
        let selftext = self.selftext.trim();
        (!selftext.is_empty()).then_some(selftext)
    }

    /// Parses a JSON array of posts
    pub fn try_parsing_list(data: &[u8]) -> Result<Vec<Self>, PostError> {
        let data = std::str::from_utf8(data)?;
        serde_json::from_str(data).map_err(|e| PostError::InvalidJsonData(e, data.to_string()))
    }
}

/// Mirror of the wire format, where the link kind is only known by which key is present
#[derive(Deserialize, Serialize)]
struct RawPost {
    title: String,
    #[serde(default)]
    selftext: String,
    permalink: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    url: Option<String>,
}

impl TryFrom<RawPost> for Post {
    type Error = PostError;

    fn try_from(raw: RawPost) -> Result<Self, Self::Error> {
        let link = match (raw.image_url, raw.url) {
            (Some(image_url), None) => PostLink::ImageUrl(image_url),
            (None, Some(url)) => PostLink::Url(url),
            (Some(_), Some(_)) => return Err(PostError::AmbiguousLink),
            (None, None) => return Err(PostError::MissingLink),
        };

        Post::try_new(raw.title, raw.selftext, raw.permalink, link)
    }
}

impl From<Post> for RawPost {
    fn from(post: Post) -> Self {
        let (image_url, url) = match post.link {
            PostLink::ImageUrl(image_url) => (Some(image_url), None),
            PostLink::Url(url) => (None, Some(url)),
        };

        Self {
            title: post.title,
            selftext: post.selftext,
            permalink: post.permalink,
            image_url,
            url,
        }
    }
}

#[derive(thiserror::Error)]
pub enum PostError {
    #[error("A post needs a non-empty title")]
    EmptyTitle,
    #[error("A post needs a non-empty permalink")]
    EmptyPermalink,
    #[error("A post carries both an `image_url` and an `url`")]
    AmbiguousLink,
    #[error("A post carries neither an `image_url` nor an `url`")]
    MissingLink,
    #[error("Data could not be converted from utf8 u8 vector to string")]
    InvalidStringData(#[from] std::str::Utf8Error),
    #[error("Data did not represent a valid list of posts: {0}. Data: {1}")]
    InvalidJsonData(serde_json::Error, String),
    #[error("Data is neither a list of posts ({as_posts}) nor a listing ({as_listing})")]
    UnrecognizedPosts {
        as_posts: String,
        as_listing: String,
    },
}

impl std::fmt::Debug for PostError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}
