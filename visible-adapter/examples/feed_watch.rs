use tracing_subscriber::EnvFilter;
use visible::{Registry, TrackerOptions, WatchEvent, WatchOptions};
use visible_adapter::SimHost;

fn main() {
    // Example: watch a feed for ads as they are inserted, report impressions (visible) and
    // dismissals (invisible), and give up on a banner that never shows up.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let sim = SimHost::new();
    let feed = sim.create_element("section");
    sim.set_id(feed, "feed");
    sim.append_child(sim.body(), feed);

    let registry = Registry::new(sim.host());
    let visibility = TrackerOptions::new().with_threshold(0.5);
    registry.watch(
        "#feed .ad",
        WatchOptions::new().with_visibility(visibility.clone()),
        |event| {
            if let WatchEvent::Matched(ad) = event {
                println!("impression {ad}");
            }
            Ok(())
        },
    );
    registry.watch_invisible(
        "#feed .ad",
        WatchOptions::new().with_visibility(visibility),
        |event| {
            if let WatchEvent::Matched(ad) = event {
                println!("dismissed {ad}");
            }
            Ok(())
        },
    );
    registry.watch(
        ".banner",
        WatchOptions::new().with_timeout_ms(1_000),
        |event| {
            if event.is_no_match() {
                println!("no banner within 1s");
            }
            Ok(())
        },
    );

    // Each page of the feed arrives as one detached subtree inserted at once.
    let mut ads = Vec::new();
    for page in 0..3 {
        let wrapper = sim.create_element("div");
        for i in 0..4 {
            let post = sim.create_element("article");
            if i == 2 {
                sim.add_class(post, "ad");
                ads.push(post);
            }
            sim.append_child(wrapper, post);
        }
        sim.append_child(feed, wrapper);
        sim.advance(250);
        println!("page {page} inserted at t={}ms", sim.now_ms());
    }

    for ad in &ads {
        sim.set_ratio(*ad, 0.8);
        sim.advance(100);
        sim.set_ratio(*ad, 0.0);
        sim.advance(100);
    }

    println!("live watchers: {}", registry.watchers().len());
    registry.destroy_all();
}
