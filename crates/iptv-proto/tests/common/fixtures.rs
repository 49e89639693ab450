#![allow(dead_code)]

use iptv_proto::catalog::CatalogSources;
use iptv_proto::model::{Channel, Feed, Stream};
use serde_json::{json, Value};

/// Deterministic catalog of `n` channels. Channel `i` has `i % 3` streams, so
/// a third of the channels have none and must be dropped by the join. A few
/// orphan and unknown-channel streams are mixed in.
pub fn synthetic_sources(n: usize) -> CatalogSources {
    let channels: Vec<Channel> = (0..n)
        .map(|i| Channel {
            id: format!("Ch{i}.xx"),
            name: format!("Channel {i}"),
            country: ["US", "UK", "FR"][i % 3].to_string(),
            categories: vec![["news", "music", "kids", "sports"][i % 4].to_string()],
            ..Channel::default()
        })
        .collect();

    let mut streams = Vec::new();
    for i in (0..n).rev() {
        for k in 0..(i % 3) {
            streams.push(Stream {
                channel: Some(format!("Ch{i}.xx")),
                url: format!("http://cdn.test/{i}/{k}.m3u8"),
                quality: Some(["720p", "480p"][k % 2].to_string()),
                ..Stream::default()
            });
        }
        if i % 5 == 0 {
            streams.push(Stream {
                channel: None,
                url: format!("http://cdn.test/orphan/{i}.m3u8"),
                ..Stream::default()
            });
        }
    }
    streams.push(Stream {
        channel: Some("Missing.zz".into()),
        url: "http://cdn.test/missing.m3u8".into(),
        ..Stream::default()
    });

    let feeds = (0..n)
        .filter(|i| i % 2 == 0)
        .map(|i| Feed {
            channel: format!("Ch{i}.xx"),
            id: "SD".into(),
            languages: vec![["eng", "fra"][i % 2].to_string()],
            ..Feed::default()
        })
        .collect();

    CatalogSources {
        channels,
        streams,
        feeds,
    }
}

pub fn channels_json() -> Value {
    json!([
        {
            "id": "BBCNews.uk",
            "name": "BBC News",
            "alt_names": ["BBC News Channel"],
            "network": "BBC",
            "owners": ["BBC"],
            "country": "UK",
            "subdivision": null,
            "city": "London",
            "categories": ["news"],
            "is_nsfw": false,
            "launched": "1997-11-09",
            "closed": null,
            "replaced_by": null,
            "website": "https://www.bbc.co.uk/news"
        },
        {
            "id": "NoStream.fr",
            "name": "Sans Flux",
            "alt_names": [],
            "network": null,
            "owners": [],
            "country": "FR",
            "categories": ["general"],
            "is_nsfw": false
        },
        {
            "id": "Euronews.fr",
            "name": "Euronews",
            "alt_names": [],
            "network": null,
            "owners": [],
            "country": "FR",
            "categories": ["news"],
            "is_nsfw": false
        }
    ])
}

pub fn streams_json() -> Value {
    json!([
        {
            "channel": "Euronews.fr",
            "feed": "EN",
            "url": "https://euronews.test/en.m3u8",
            "referrer": null,
            "user_agent": null,
            "quality": "1080p"
        },
        {
            "channel": "BBCNews.uk",
            "feed": null,
            "url": "https://bbc.test/news/hd.m3u8",
            "referrer": "https://bbc.test/",
            "user_agent": "Mozilla/5.0",
            "quality": "720p"
        },
        {
            "channel": null,
            "feed": null,
            "url": "https://orphan.test/live.m3u8",
            "referrer": null,
            "user_agent": null,
            "quality": null
        },
        {
            "channel": "BBCNews.uk",
            "feed": null,
            "url": "https://bbc.test/news/sd.m3u8",
            "referrer": null,
            "user_agent": null,
            "quality": "480p"
        }
    ])
}

pub fn feeds_json() -> Value {
    json!([
        {
            "channel": "Euronews.fr",
            "id": "EN",
            "name": "English",
            "is_main": true,
            "broadcast_area": ["r/INT"],
            "timezones": ["Europe/Paris"],
            "languages": ["eng"],
            "format": "1080i"
        },
        {
            "channel": "Euronews.fr",
            "id": "FR",
            "name": "French",
            "is_main": false,
            "broadcast_area": ["c/FR"],
            "timezones": ["Europe/Paris"],
            "languages": ["fra"],
            "format": "1080i"
        }
    ])
}

pub fn categories_json() -> Value {
    json!([
        { "id": "general", "name": "General" },
        { "id": "news", "name": "News" }
    ])
}

pub fn countries_json() -> Value {
    json!([
        { "name": "France", "code": "FR", "languages": ["fra"], "flag": "🇫🇷" },
        { "name": "United Kingdom", "code": "UK", "languages": ["eng"], "flag": "🇬🇧" }
    ])
}

pub fn languages_json() -> Value {
    json!([
        { "name": "English", "code": "eng" },
        { "name": "French", "code": "fra" }
    ])
}

pub fn regions_json() -> Value {
    json!([
        { "code": "EUR", "name": "Europe", "countries": ["FR", "UK"] }
    ])
}
