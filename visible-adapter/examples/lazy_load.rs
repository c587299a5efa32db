use std::cell::RefCell;
use std::rc::Rc;

use tracing_subscriber::EnvFilter;
use visible::{IntersectionEntry, TrackOptions, Tracker, TrackerOptions, handler};
use visible_adapter::{NodeId, SimHost};

fn main() {
    // Example: lazy-load images the first time at least half of each one is on screen.
    //
    // A real adapter would feed ratios from its layout; here the "scroll" is simulated by
    // setting ratios by hand. Run with `RUST_LOG=visible=debug` to see the tracker's events.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let sim = SimHost::new();
    let images: Vec<NodeId> = (0..6)
        .map(|_| {
            let img = sim.create_element("img");
            sim.add_class(img, "lazy");
            sim.append_child(sim.body(), img);
            img
        })
        .collect();

    let loaded = Rc::new(RefCell::new(Vec::new()));
    let tracker = Tracker::new(
        &sim.host(),
        TrackerOptions::new()
            .with_threshold(0.5)
            .with_once(true)
            .with_debug(true),
    );
    let load = {
        let loaded = Rc::clone(&loaded);
        handler(move |img: &NodeId, entry: &IntersectionEntry<NodeId>| {
            println!("load {img} (ratio={:.2})", entry.ratio);
            loaded.borrow_mut().push(*img);
            Ok(())
        })
    };
    tracker.track(images.clone(), TrackOptions::new(), Some(load));
    sim.flush();

    // Scroll down one "image" at a time: the two images in view are fully visible, the ones
    // at the edges half-visible.
    for top in 0..images.len() {
        for (i, img) in images.iter().enumerate() {
            let ratio = match i.checked_sub(top) {
                Some(0 | 1) => 1.0,
                Some(2) => 0.4,
                _ => 0.0,
            };
            sim.set_ratio(*img, ratio);
        }
        sim.flush();
        println!(
            "top={top} loaded={} still_tracked={}",
            loaded.borrow().len(),
            tracker.tracked_elements().len()
        );
    }

    tracker.destroy();
}
