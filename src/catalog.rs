use std::collections::HashSet;

use chrono::Utc;
use fuzzy_matcher::skim::SkimMatcherV2;
use fuzzy_matcher::FuzzyMatcher;
use rand::Rng;

use crate::errors::StoreError;
use crate::model::{Channel, ContentType, Movie};
use crate::playlist::parse_m3u;
use crate::state::LocalState;
use crate::storage::KeyValueStore;

pub const DEFAULT_CHANNEL_GROUP: &str = "General";
pub const DEFAULT_POSTER: &str = "https://picsum.photos/300/450";
pub const DEFAULT_BACKDROP: &str = "https://picsum.photos/1200/800";

/// Admin form input for a new channel
#[derive(Debug, Clone, Default)]
pub struct NewChannel {
    pub name: String,
    pub url: String,
    pub group: Option<String>,
    pub logo: Option<String>,
}

/// Admin form input for a new movie or series
#[derive(Debug, Clone, Default)]
pub struct NewMovie {
    pub title: String,
    pub url: String,
    pub description: Option<String>,
    pub poster: Option<String>,
    pub backdrop: Option<String>,
    pub year: Option<String>,
    pub genre: Option<Vec<String>>,
    pub rating: Option<String>,
    pub content_type: ContentType,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Millisecond timestamp id, bumped until it is unused
fn fresh_id(taken: &HashSet<&str>) -> String {
    let mut n = Utc::now().timestamp_millis();
    loop {
        let id = n.to_string();
        if !taken.contains(id.as_str()) {
            return id;
        }
        n += 1;
    }
}

pub fn verify_admin_password<S: KeyValueStore>(state: &LocalState<S>, input: &str) -> bool {
    input == state.load_config().effective_admin_password()
}

/// Returns the created channel, or `None` when name or url is missing
pub fn add_channel<S: KeyValueStore>(
    state: &LocalState<S>,
    input: NewChannel,
) -> Result<Option<Channel>, StoreError> {
    let name = input.name.trim();
    let url = input.url.trim();
    if name.is_empty() || url.is_empty() {
        return Ok(None);
    }
    let mut channels = state.channels();
    let id = {
        let taken: HashSet<&str> = channels.iter().map(|c| c.id.as_str()).collect();
        fresh_id(&taken)
    };
    let channel = Channel {
        id,
        name: name.to_string(),
        url: url.to_string(),
        group: non_empty(input.group).unwrap_or_else(|| DEFAULT_CHANNEL_GROUP.to_string()),
        logo: non_empty(input.logo).unwrap_or_default(),
    };
    channels.push(channel.clone());
    state.save_channels(&channels)?;
    Ok(Some(channel))
}

/// Returns whether a channel was removed
pub fn delete_channel<S: KeyValueStore>(state: &LocalState<S>, id: &str) -> Result<bool, StoreError> {
    let mut channels = state.channels();
    let before = channels.len();
    channels.retain(|c| c.id != id);
    if channels.len() == before {
        return Ok(false);
    }
    state.save_channels(&channels)?;
    Ok(true)
}

/// Give every channel in `incoming` an id not used by `existing` (nor by an
/// earlier incoming channel)
pub fn rekey_collisions(existing: &[Channel], incoming: &mut [Channel]) {
    let mut taken: HashSet<String> = existing.iter().map(|c| c.id.clone()).collect();
    let mut rng = rand::thread_rng();
    for channel in incoming.iter_mut() {
        while taken.contains(&channel.id) {
            channel.id = format!("{}-{:05x}", channel.id, rng.gen_range(0..0x100000u32));
        }
        taken.insert(channel.id.clone());
    }
}

/// Parse `playlist` and append its channels; returns the number imported
pub fn import_playlist<S: KeyValueStore>(state: &LocalState<S>, playlist: &str) -> Result<usize, StoreError> {
    let mut parsed = parse_m3u(playlist);
    if parsed.is_empty() {
        tracing::info!("Playlist import found no channels");
        return Ok(0);
    }
    let mut channels = state.channels();
    rekey_collisions(&channels, &mut parsed);
    let count = parsed.len();
    channels.extend(parsed);
    state.save_channels(&channels)?;
    tracing::info!(count, total = channels.len(), "Imported playlist");
    Ok(count)
}

/// Returns the created movie, or `None` when title or url is missing
pub fn add_movie<S: KeyValueStore>(state: &LocalState<S>, input: NewMovie) -> Result<Option<Movie>, StoreError> {
    let title = input.title.trim();
    let url = input.url.trim();
    if title.is_empty() || url.is_empty() {
        return Ok(None);
    }
    let mut movies = state.movies();
    let id = {
        let taken: HashSet<&str> = movies.iter().map(|m| m.id.as_str()).collect();
        fresh_id(&taken)
    };
    let movie = Movie {
        id,
        title: title.to_string(),
        url: url.to_string(),
        description: non_empty(input.description).unwrap_or_default(),
        poster: non_empty(input.poster).unwrap_or_else(|| DEFAULT_POSTER.to_string()),
        backdrop: non_empty(input.backdrop).unwrap_or_else(|| DEFAULT_BACKDROP.to_string()),
        year: non_empty(input.year).unwrap_or_else(|| "2024".to_string()),
        genre: input
            .genre
            .filter(|g| !g.is_empty())
            .unwrap_or_else(|| vec!["Unknown".to_string()]),
        rating: non_empty(input.rating).unwrap_or_else(|| "NR".to_string()),
        content_type: input.content_type,
    };
    movies.push(movie.clone());
    state.save_movies(&movies)?;
    Ok(Some(movie))
}

pub fn delete_movie<S: KeyValueStore>(state: &LocalState<S>, id: &str) -> Result<bool, StoreError> {
    let mut movies = state.movies();
    let before = movies.len();
    movies.retain(|m| m.id != id);
    if movies.len() == before {
        return Ok(false);
    }
    state.save_movies(&movies)?;
    Ok(true)
}

/// Fuzzy search over channel name and group, best match first.
/// An empty query returns every channel in list order.
pub fn search_channels<'a>(channels: &'a [Channel], query: &str) -> Vec<&'a Channel> {
    let query = query.trim();
    if query.is_empty() {
        return channels.iter().collect();
    }
    let matcher = SkimMatcherV2::default().ignore_case();
    let mut scored: Vec<(i64, usize, &Channel)> = channels
        .iter()
        .enumerate()
        .filter_map(|(i, c)| {
            let by_name = matcher.fuzzy_match(&c.name, query);
            let by_group = matcher.fuzzy_match(&c.group, query).map(|s| s / 2);
            by_name.max(by_group).map(|score| (score, i, c))
        })
        .collect();
    scored.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
    scored.into_iter().map(|(_, _, c)| c).collect()
}

/// Distinct groups in first-seen order
pub fn groups(channels: &[Channel]) -> Vec<&str> {
    let mut seen = HashSet::new();
    channels
        .iter()
        .map(|c| c.group.as_str())
        .filter(|g| seen.insert(*g))
        .collect()
}

pub fn featured_movie<'a>(movies: &'a [Movie], featured_id: Option<&str>) -> Option<&'a Movie> {
    featured_id
        .and_then(|id| movies.iter().find(|m| m.id == id))
        .or_else(|| movies.first())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::demo_channels;
    use crate::storage::MemoryStore;

    fn state() -> LocalState<MemoryStore> {
        LocalState::new(MemoryStore::new())
    }

    #[test]
    fn test_add_channel_requires_name_and_url() {
        let s = state();
        let added = add_channel(&s, NewChannel { name: "X".into(), ..Default::default() }).unwrap();
        assert!(added.is_none());
        assert_eq!(s.channels(), demo_channels());
    }

    #[test]
    fn test_add_and_delete_channel() {
        let s = state();
        let added = add_channel(
            &s,
            NewChannel {
                name: "Rudaw".into(),
                url: "https://x/rudaw.m3u8".into(),
                group: Some("  ".into()),
                logo: None,
            },
        )
        .unwrap()
        .unwrap();
        assert_eq!(added.group, DEFAULT_CHANNEL_GROUP);
        assert_eq!(s.channels().len(), demo_channels().len() + 1);

        assert!(delete_channel(&s, &added.id).unwrap());
        assert!(!delete_channel(&s, &added.id).unwrap());
        assert_eq!(s.channels(), demo_channels());
    }

    #[test]
    fn test_import_twice_keeps_ids_unique() {
        let s = state();
        let playlist = "#EXTINF:-1 group-title=\"News\",Rudaw\nhttp://x/rudaw.m3u8\n";
        assert_eq!(import_playlist(&s, playlist).unwrap(), 1);
        assert_eq!(import_playlist(&s, playlist).unwrap(), 1);
        let channels = s.channels();
        let ids: HashSet<&str> = channels.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids.len(), channels.len());
    }

    #[test]
    fn test_import_empty_playlist_changes_nothing() {
        let s = state();
        assert_eq!(import_playlist(&s, "#EXTM3U\n").unwrap(), 0);
        assert_eq!(s.channels(), demo_channels());
    }

    #[test]
    fn test_add_movie_fills_defaults() {
        let s = state();
        let movie = add_movie(
            &s,
            NewMovie {
                title: "Sintel".into(),
                url: "https://x/sintel.mp4".into(),
                ..Default::default()
            },
        )
        .unwrap()
        .unwrap();
        assert_eq!(movie.poster, DEFAULT_POSTER);
        assert_eq!(movie.genre, vec!["Unknown".to_string()]);
        assert_eq!(movie.rating, "NR");
        assert!(delete_movie(&s, &movie.id).unwrap());
    }

    #[test]
    fn test_admin_password() {
        let s = state();
        assert!(verify_admin_password(&s, "admin"));
        let mut cfg = s.load_config();
        cfg.admin_password = Some("s3cret".into());
        s.save_config(&cfg).unwrap();
        assert!(!verify_admin_password(&s, "admin"));
        assert!(verify_admin_password(&s, "s3cret"));
    }

    #[test]
    fn test_search_and_groups() {
        let channels = vec![
            Channel { id: "1".into(), name: "Rudaw HD".into(), group: "News".into(), logo: String::new(), url: "u".into() },
            Channel { id: "2".into(), name: "Kurdsat".into(), group: "News".into(), logo: String::new(), url: "u".into() },
            Channel { id: "3".into(), name: "Zarok".into(), group: "Kids".into(), logo: String::new(), url: "u".into() },
        ];
        let hits = search_channels(&channels, "rudaw");
        assert_eq!(hits[0].id, "1");
        assert!(hits.iter().all(|c| c.id != "3"));
        assert_eq!(search_channels(&channels, " ").len(), 3);
        assert_eq!(groups(&channels), vec!["News", "Kids"]);
    }
}
