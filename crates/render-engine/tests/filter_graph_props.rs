use proptest::prelude::*;
use stillmotion_model::{ImageDuration, Resolution, RenderSettings, TransitionStyle};
use stillmotion_render_engine::{FilterGraphBuilder, NodeRole, Port};

fn any_style() -> impl Strategy<Value = TransitionStyle> {
    prop::sample::select(TransitionStyle::ALL.to_vec())
}

fn any_duration() -> impl Strategy<Value = ImageDuration> {
    prop::sample::select(ImageDuration::ALL.to_vec())
}

fn any_resolution() -> impl Strategy<Value = Resolution> {
    prop::sample::select(vec![Resolution::Hd720, Resolution::Hd1080])
}

proptest! {
    #[test]
    fn graph_has_one_transition_per_adjacent_pair(
        count in 2usize..24,
        style in any_style(),
        duration in any_duration(),
        resolution in any_resolution(),
    ) {
        let settings = RenderSettings { resolution, image_duration: duration, transition: style };
        let graph = FilterGraphBuilder::from_settings(&settings).build(count).unwrap();

        prop_assert_eq!(graph.clip_nodes().count(), count);
        prop_assert_eq!(graph.transition_nodes().count(), count - 1);
        prop_assert!(graph.validate().is_ok());
        prop_assert_eq!(graph.output(), &Port::Link("outv".into()));

        let offsets = graph.transition_offsets();
        let d = duration.secs() as f64;
        for (i, offset) in offsets.iter().enumerate() {
            let index = (i + 1) as f64;
            prop_assert_eq!(*offset, index * d - index * 0.5);
        }
        prop_assert!(offsets.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[test]
    fn single_image_graph_is_passthrough(
        style in any_style(),
        duration in any_duration(),
        resolution in any_resolution(),
    ) {
        let settings = RenderSettings { resolution, image_duration: duration, transition: style };
        let graph = FilterGraphBuilder::from_settings(&settings).build(1).unwrap();

        prop_assert_eq!(graph.transition_nodes().count(), 0);
        let last = graph.nodes().last().unwrap();
        prop_assert_eq!(last.role, NodeRole::Passthrough);
        prop_assert!(graph.to_string().ends_with("[v0]copy[outv]"));
    }
}
