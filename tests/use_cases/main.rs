mod helpers;
mod search_posts;
