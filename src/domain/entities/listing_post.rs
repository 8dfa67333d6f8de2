use serde::{Deserialize, Deserializer};
use tracing::debug;

use super::post::{Post, PostError, PostLink};

pub const PERMALINK_BASE_URL: &str = "https://reddit.com";

/// A post as returned by a subreddit listing (`/r/{subreddit}/{hot,new,top}`).
///
/// Only the fields needed to build a `Post` are kept.
#[derive(Debug, Deserialize)]
pub struct ListingPost {
    pub title: String,
    #[serde(default)]
    pub selftext: String,
    /// Relative to the site root, ex: `/r/pics/comments/abc/sunset/`
    pub permalink: String,
    pub url: String,
    /// Only present when the site detected a media kind (image, video, link preview)
    #[serde(default)]
    pub post_hint: Option<String>,
    /// `Some` as soon as the key is present, even with a `null` or `false` value
    #[serde(default, deserialize_with = "deserialize_present_key")]
    pub is_gallery: Option<serde_json::Value>,
}

fn deserialize_present_key<'de, D>(deserializer: D) -> Result<Option<serde_json::Value>, D::Error>
where
    D: Deserializer<'de>,
{
    serde_json::Value::deserialize(deserializer).map(Some)
}

impl ListingPost {
    /// Converts a listing entry into a `Post`.
    ///
    /// Galleries hold several images behind a single URL and are skipped (`Ok(None)`).
    pub fn into_post(self) -> Result<Option<Post>, PostError> {
        // The key being present is enough to flag a gallery
        if self.is_gallery.is_some() {
            debug!(permalink = %self.permalink, "Skipping gallery post");
            return Ok(None);
        }

        let link = match self.post_hint {
            Some(_) => PostLink::ImageUrl(self.url),
            None => PostLink::Url(self.url),
        };

        Post::try_new(
            self.title,
            self.selftext,
            format!("{}{}", PERMALINK_BASE_URL, self.permalink),
            link,
        )
        .map(Some)
    }
}

/// Envelope of a listing response: `{"data": {"children": [{"data": {...}}]}}`
#[derive(Debug, Deserialize)]
pub struct Listing {
    pub data: ListingData,
}

#[derive(Debug, Deserialize)]
pub struct ListingData {
    pub children: Vec<ListingChild>,
}

#[derive(Debug, Deserialize)]
pub struct ListingChild {
    pub data: ListingPost,
}

impl Listing {
    /// Posts that can be ingested, in listing order. Galleries are left out.
    pub fn into_posts(self) -> Result<Vec<Post>, PostError> {
        let mut posts = Vec::with_capacity(self.data.children.len());

        for child in self.data.children {
            if let Some(post) = child.data.into_post()? {
                posts.push(post);
            }
        }

        Ok(posts)
    }
}

/// Reads posts from a JSON array of posts, or falls back to a listing envelope.
///
/// When both shapes fail, the error carries the reason of each attempt.
pub fn try_parsing_posts_or_listing(data: &[u8]) -> Result<Vec<Post>, PostError> {
    let posts_error = match Post::try_parsing_list(data) {
        Ok(posts) => return Ok(posts),
        Err(PostError::InvalidJsonData(error, _)) => error.to_string(),
        Err(error) => error.to_string(),
    };

    match serde_json::from_slice::<Listing>(data) {
        Ok(listing) => listing.into_posts(),
        Err(listing_error) => Err(PostError::UnrecognizedPosts {
            as_posts: posts_error,
            as_listing: listing_error.to_string(),
        }),
    }
}
