//! Name slugging matching host entity id conventions

/// Slugify a scene name into host object_id form ("Movie Night" -> "movie_night").
pub fn slugify(value: &str) -> String {
    slug::slugify(value).replace('-', "_")
}
