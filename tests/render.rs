use select_ui::{
	cell,
	dom::DomNode,
	mem::{Document, Node},
	ui, Component, Propagation, TemplateBuilder, Value,
};
use serde_json::json;
use std::{
	cell::{Cell, RefCell},
	rc::Rc,
};

fn template(html: &str) -> TemplateBuilder<Node> {
	ui(&Document::new(), html).unwrap()
}

fn field(name: &'static str) -> impl Fn(&select_ui::Instance<Node>, &Value<Node>, Option<&select_ui::mem::Event>) -> Value<Node> {
	move |_, data, _| data.get(name).cloned().unwrap_or_default()
}

#[test]
fn leaf_renders_text() {
	let instance = template("<p>old</p><i>kept</i>").build().unwrap().new(None).unwrap();
	instance.set(json!("hello").into(), None);
	assert_eq!(instance.nodes()[0].outer_html(), "<p>hello</p>");
	instance.set(json!(42).into(), None);
	assert_eq!(instance.nodes()[0].outer_html(), "<p>42</p>");
	instance.set(Value::Null, None);
	assert_eq!(instance.nodes()[0].outer_html(), "<p></p>");
	assert_eq!(instance.nodes()[1].outer_html(), "<i>kept</i>");
}

#[test]
fn markers_are_stripped() {
	let component = template(r#"<div on="a" in="b" out="c" inout="d" ref="e" when="data" out:title="f"></div>"#).build().unwrap();
	let instance = component.new(None).unwrap();
	assert_eq!(instance.nodes()[0].outer_html(), "<div></div>");
}

#[test]
fn set_is_idempotent() {
	let instance = template(r#"<ul out="items"></ul>"#).build().unwrap().new(None).unwrap();
	let ul = instance.nodes()[0].clone();
	instance.set(json!(["a", "b"]).into(), None);
	let html = ul.outer_html();
	let children = ul.child_nodes();
	instance.set(json!(["a", "b"]).into(), None);
	assert_eq!(ul.outer_html(), html);
	assert_eq!(ul.child_nodes(), children);
}

#[test]
fn list_items_are_reused_by_index() {
	let instance = template(r#"<ul out="items"></ul>"#).build().unwrap().new(None).unwrap();
	let ul = instance.nodes()[0].clone();
	instance.set(json!(["a", "b", "c"]).into(), None);
	assert_eq!(ul.outer_html(), "<ul>abc</ul>");
	let before = ul.child_nodes();

	instance.set(json!(["a", "c"]).into(), None);
	assert_eq!(ul.outer_html(), "<ul>ac</ul>");
	assert_eq!(ul.child_nodes(), before[..2]);
	assert_eq!(before[2].parent_node(), None);
	assert_eq!(instance.slots("items")[0].keys(), ["0", "1"]);
}

#[test]
fn placeholder_shows_while_empty() {
	let instance = template(r#"<ul out="items"><li>nothing</li></ul>"#).build().unwrap().new(None).unwrap();
	let ul = instance.nodes()[0].clone();
	assert_eq!(ul.inner_html(), "<li>nothing</li>");
	instance.set(json!(["a"]).into(), None);
	assert_eq!(ul.inner_html(), "a");
	instance.set(json!([]).into(), None);
	assert_eq!(ul.inner_html(), "<li>nothing</li>");
}

#[test]
fn keyed_children_update_in_place() {
	let item = template(r#"<li out="name"></li>"#).action("name", field("name")).build().unwrap();
	let list = template(r#"<ul out="items"></ul>"#).build().unwrap().new(None).unwrap();
	let ul = list.nodes()[0].clone();

	list.set(Value::dict([("a", item.apply(json!({"name": "x"}))), ("b", item.apply(json!({"name": "y"})))]), None);
	assert_eq!(ul.outer_html(), "<ul><li>x</li><li>y</li></ul>");
	let slot = list.slots("items")[0];
	let a = slot.instance("a").unwrap();
	let b = slot.instance("b").unwrap();
	assert_eq!(b.key().as_deref(), Some("b"));
	assert_eq!(b.parent(), Some(list.clone()));

	list.set(Value::dict([("b", item.apply(json!({"name": "z"})))]), None);
	assert_eq!(ul.outer_html(), "<ul><li>z</li></ul>");
	assert_eq!(slot.instance("b"), Some(b.clone()));
	assert_eq!(b.data(), Value::from(json!({"name": "z"})));
	assert_eq!(slot.instance("a"), None);
	assert_eq!(a.nodes()[0].parent_node(), None);
}

#[test]
fn map_wraps_each_item() {
	let item = template("<li></li>").build().unwrap();
	let list = template(r#"<ul out="items"></ul>"#).action("items", {
		let item = item.clone();
		move |_, data, _| item.map(data)
	});
	let list = list.build().unwrap().new(None).unwrap();
	list.set(json!([1, 2, 3]).into(), None);
	assert_eq!(list.nodes()[0].outer_html(), "<ul><li>1</li><li>2</li><li>3</li></ul>");
	assert_eq!(Component::map(&item, &json!("x").into()), Value::from(json!("x")));
}

#[test]
fn behaviours_are_memoized_per_render() {
	let calls = Rc::new(Cell::new(0));
	let instance = template(r#"<div><b out="label"></b><i out="label"></i></div>"#)
		.action("label", {
			let calls = calls.clone();
			move |_, data, _| {
				calls.set(calls.get() + 1);
				data.get("text").cloned().unwrap_or_default()
			}
		})
		.build()
		.unwrap()
		.new(None)
		.unwrap();
	instance.set(json!({"text": "t"}).into(), None);
	assert_eq!(calls.get(), 1);
	assert_eq!(instance.nodes()[0].outer_html(), "<div><b>t</b><i>t</i></div>");
	instance.render();
	assert_eq!(calls.get(), 2);
}

#[test]
fn classes_and_styles_keep_authored_values() {
	let instance = template(r#"<div class="foo" style="color: red" out:class="state" out:style="look"></div>"#)
		.behavior("state", select_ui::Behavior::<Node>::attribute(|_, data, _, _| data.get("classes").cloned().unwrap_or_default()))
		.behavior("look", select_ui::Behavior::<Node>::attribute(|_, data, _, _| data.get("style").cloned().unwrap_or_default()))
		.build()
		.unwrap()
		.new(None)
		.unwrap();
	let div = instance.nodes()[0].clone();

	instance.set(json!({"classes": {"bar": true}, "style": {"marginTop": "1px"}}).into(), None);
	assert_eq!(div.get_attribute("class").as_deref(), Some("foo bar"));
	assert_eq!(div.get_attribute("style").as_deref(), Some("color: red; margin-top: 1px;"));

	instance.set(json!({"classes": {"bar": false}}).into(), None);
	assert_eq!(div.get_attribute("class").as_deref(), Some("foo"));
	assert_eq!(div.get_attribute("style").as_deref(), Some("color: red;"));
}

#[test]
fn when_swaps_in_a_placeholder() {
	let instance = template(r#"<div><p when="data.show">x</p><span out="label"></span></div>"#)
		.action("label", field("label"))
		.build()
		.unwrap()
		.new(None)
		.unwrap();
	let div = instance.nodes()[0].clone();
	let p = div.child_nodes()[0].clone();

	instance.set(json!({"show": true, "label": "l"}).into(), None);
	assert_eq!(div.inner_html(), "<p>x</p><span>l</span>");

	instance.set(json!({"show": false, "label": "l"}).into(), None);
	assert_eq!(div.inner_html(), "<!-- when: data.show --><span>l</span>");
	assert_eq!(p.parent_node(), None);
	assert!(!instance.when_slots()[0].is_shown());

	instance.set(json!({"show": 1, "label": "l"}).into(), None);
	assert_eq!(div.child_nodes()[0], p);
}

#[test]
fn reactive_initial_state_drives_rendering() {
	let show = cell(Value::<Node>::Bool(true));
	let component = template(r#"<section><p when="data.show">x</p><b out="count"></b></section>"#)
		.action("count", |_, data, _| data.get("count").map(Value::as_text).unwrap_or_default().into())
		.init({
			let show = show.clone();
			move || Value::dict([("show", Value::Reactive(show.clone())), ("count", json!(0).into())])
		})
		.build()
		.unwrap();
	let instance = component.new(None).unwrap();
	let section = instance.nodes()[0].clone();
	assert_eq!(instance.initial().get("count"), Some(&Value::from(0)));
	assert_eq!(section.inner_html(), "<p>x</p><b>0</b>");
	assert_eq!(instance.subscription_count(), 1);
	assert_eq!(show.subscriber_count(), 1);

	show.set(Value::Bool(false));
	assert_eq!(section.inner_html(), "<!-- when: data.show --><b>0</b>");
	show.set(Value::Bool(true));
	assert_eq!(section.inner_html(), "<p>x</p><b>0</b>");

	instance.unmount();
	assert_eq!(instance.subscription_count(), 0);
	assert_eq!(show.subscriber_count(), 0);
}

#[test]
fn update_only_renders_changes() {
	let renders = Rc::new(Cell::new(0));
	let instance = template(r#"<b out="n"></b>"#)
		.action("n", {
			let renders = renders.clone();
			move |_, data, _| {
				renders.set(renders.get() + 1);
				data.get("n").cloned().unwrap_or_default()
			}
		})
		.build()
		.unwrap()
		.new(None)
		.unwrap();

	assert!(instance.update(json!({"n": 1}).into(), false));
	assert_eq!(renders.get(), 1);
	assert!(!instance.update(json!({"n": 1}).into(), false));
	assert_eq!(renders.get(), 1);
	assert!(instance.update(json!({"n": 1}).into(), true));
	assert_eq!(renders.get(), 2);
	assert!(instance.update(json!({"m": 2}).into(), false));
	assert_eq!(instance.data(), Value::from(json!({"n": 1, "m": 2})));
	assert!(!instance.update(json!(3).into(), false));
}

#[test]
fn update_tracks_the_current_reactive() {
	let first = cell(Value::<Node>::from("one"));
	let second = cell(Value::<Node>::from("two"));
	let instance = template(r#"<b out="v"></b>"#).action("v", field("v")).build().unwrap().new(None).unwrap();
	let b = instance.nodes()[0].clone();

	instance.update(Value::dict([("v", Value::Reactive(first.clone()))]), false);
	assert_eq!(b.outer_html(), "<b>one</b>");
	assert_eq!(first.subscriber_count(), 1);

	instance.update(Value::dict([("v", Value::Reactive(second.clone()))]), false);
	assert_eq!(b.outer_html(), "<b>two</b>");
	assert_eq!(first.subscriber_count(), 0);
	assert_eq!(second.subscriber_count(), 1);

	second.set("three".into());
	assert_eq!(b.outer_html(), "<b>three</b>");
}

#[test]
fn dom_events_reach_behaviours() {
	let clicks = Rc::new(Cell::new(0));
	let keys = Rc::new(RefCell::new(Vec::new()));
	let instance = template(r#"<form><button on="press">go</button><input in="text"></form>"#)
		.action("press", {
			let clicks = clicks.clone();
			move |_, _, event| {
				if event.is_some() {
					clicks.set(clicks.get() + 1);
				}
				Value::Null
			}
		})
		.behavior(
			"text",
			select_ui::Behavior::<Node>::events().event("keyup", {
				let keys = keys.clone();
				move |_, _, event| keys.borrow_mut().push(event.kind.clone())
			}),
		)
		.build()
		.unwrap()
		.new(None)
		.unwrap();
	let form = instance.nodes()[0].clone();
	let button = form.child_nodes()[0].clone();
	let input = form.child_nodes()[1].clone();

	assert_eq!(button.listener_count(), 1);
	assert_eq!(button.dispatch("click"), 1);
	assert_eq!(clicks.get(), 1);
	assert_eq!(input.dispatch("input"), 0);
	assert_eq!(input.dispatch("keyup"), 1);
	assert_eq!(*keys.borrow(), ["keyup"]);

	drop(instance);
	assert_eq!(button.listener_count(), 0);
}

#[test]
fn refs_resolve_in_the_clone() {
	let component = template(r#"<form ref="form"><input ref="field"><input ref="field"></form>"#).build().unwrap();
	let instance = component.new(None).unwrap();
	assert_eq!(instance.ref_node("form"), Some(instance.nodes()[0].clone()));
	assert_eq!(instance.ref_nodes("field").len(), 2);
	assert_eq!(instance.ref_node("field").unwrap().parent_node(), Some(instance.nodes()[0].clone()));
	assert_eq!(instance.ref_node("missing"), None);
	assert_ne!(instance.ref_node("form"), Some(component.template().nodes()[0].clone()));
}

fn recorder(log: &Rc<RefCell<Vec<&'static str>>>, name: &'static str, result: Propagation) -> impl Fn(&select_ui::Instance<Node>, &Value<Node>, &select_ui::UiEvent<Node>) -> Propagation {
	let log = log.clone();
	move |_, _, _| {
		log.borrow_mut().push(name);
		result
	}
}

#[test]
fn propagation() {
	for (result, expected) in [
		(Propagation::Continue, &["p1", "p2", "g"][..]),
		(Propagation::Local, &["p1", "p2"][..]),
		(Propagation::Stop, &["p1"][..]),
	] {
		let log = Rc::new(RefCell::new(Vec::new()));
		let grandparent = template("<main></main>").sub("ping", recorder(&log, "g", Propagation::Continue)).build().unwrap().new(None).unwrap();
		let parent = template("<div></div>")
			.sub("ping", recorder(&log, "p1", result))
			.sub("ping", recorder(&log, "p2", Propagation::Continue))
			.sub("other", recorder(&log, "x", Propagation::Continue))
			.build()
			.unwrap()
			.new(Some(&grandparent))
			.unwrap();
		let child = template("<span></span>").build().unwrap().new(Some(&parent)).unwrap();

		let event = child.send("ping", 1, None);
		assert_eq!(*log.borrow(), expected);
		assert_eq!(event.source, child);
		assert_eq!(event.data, Value::Number(1.0));
		let last = if expected.contains(&"g") { &grandparent } else { &parent };
		assert_eq!(event.current.as_ref(), Some(last));
	}
}

#[test]
fn unit_handlers_continue() {
	let seen = Rc::new(Cell::new(false));
	let root = template("<div></div>")
		.sub("hi", {
			let seen = seen.clone();
			move |_, _, _| seen.set(true)
		})
		.build()
		.unwrap()
		.new(None)
		.unwrap();
	let middle = template("<div></div>").on("hi", |_, _, _| ()).build().unwrap().new(Some(&root)).unwrap();
	middle.send("hi", Value::Null, None);
	assert!(seen.get());
}

#[test]
fn slot_children_publish_to_their_owner() {
	let received = Rc::new(RefCell::new(Vec::new()));
	let item = template("<li></li>").build().unwrap();
	let list = template(r#"<ul out="items"></ul>"#)
		.sub("pick", {
			let received = received.clone();
			move |_, _, event| received.borrow_mut().push(event.source.key())
		})
		.build()
		.unwrap()
		.new(None)
		.unwrap();
	list.set(item.map(&json!({"a": 1, "b": 2}).into()), None);

	list.slots("items")[0].instance("b").unwrap().send("pick", Value::Null, None);
	assert_eq!(*received.borrow(), [Some("b".to_owned())]);
}

#[test]
fn mounting() {
	let document = Document::from_html(r#"<div id="app"><hr></div>"#).unwrap();
	let instance = template("<p>a</p><p>b</p>").build().unwrap().new(None).unwrap();

	instance.mount_to(&document, "#missing");
	assert_eq!(instance.nodes()[0].parent_node(), None);

	instance.mount_to(&document, "#app");
	let app = document.root().child_nodes()[0].clone();
	assert_eq!(app.outer_html(), r#"<div id="app"><hr><p>a</p><p>b</p></div>"#);

	instance.unmount();
	assert_eq!(app.outer_html(), r#"<div id="app"><hr></div>"#);

	instance.mount(&app, None);
	assert_eq!(app.outer_html(), r#"<div id="app"><p>a</p><p>b</p><hr></div>"#);
}

#[test]
fn root_when_placeholder_follows_mounting() {
	let document = Document::from_html(r#"<div id="app"></div>"#).unwrap();
	let instance = template(r#"<p when="data.show" out:title="show"></p>"#).build().unwrap().new(None).unwrap();
	let p = instance.nodes()[0].clone();
	instance.mount_to(&document, "#app");
	let app = document.root().child_nodes()[0].clone();

	instance.set(json!({"show": true}).into(), None);
	assert_eq!(app.child_nodes(), [p.clone()]);

	instance.set(json!({"show": false}).into(), None);
	assert_eq!(app.outer_html(), r#"<div id="app"><!-- when: data.show --></div>"#);
	assert_eq!(instance.visible_nodes()[0].parent_node(), Some(app.clone()));

	instance.unmount();
	assert_eq!(app.outer_html(), r#"<div id="app"></div>"#);
	assert_eq!(p.parent_node(), None);

	instance.mount(&app, None);
	assert_eq!(app.outer_html(), r#"<div id="app"><!-- when: data.show --></div>"#);
	instance.set(json!({"show": true}).into(), None);
	assert_eq!(app.child_nodes(), [p]);
}

#[test]
fn instance_entries_accept_plain_values() {
	let item = template("<li></li>").build().unwrap();
	let list = template(r#"<ul out="items"></ul>"#).build().unwrap().new(None).unwrap();
	list.set(Value::dict([("a", item.apply(json!("x")))]), None);
	assert_eq!(list.nodes()[0].outer_html(), "<ul><li>x</li></ul>");
	let child = list.slots("items")[0].instance("a").unwrap();

	list.set(Value::dict([("a", Value::from("y"))]), None);
	assert_eq!(list.nodes()[0].outer_html(), "<ul><li>y</li></ul>");
	assert_eq!(list.slots("items")[0].instance("a"), Some(child.clone()));
	assert_eq!(child.key().as_deref(), Some("a"));
}

#[test]
fn children_may_inspect_a_rendering_slot() {
	let seen = Rc::new(RefCell::new(Vec::new()));
	let item = template(r#"<li out="v"></li>"#)
		.action("v", {
			let seen = seen.clone();
			move |instance, data, _| {
				if let Some(owner) = instance.parent() {
					let slot = &owner.slots("items")[0];
					seen.borrow_mut().push((slot.keys(), slot.instance("a").is_some()));
				}
				data.clone()
			}
		})
		.build()
		.unwrap();
	let list = template(r#"<ul out="items"></ul>"#).build().unwrap().new(None).unwrap();
	list.set(Value::dict([("a", item.apply(json!("x")))]), None);
	assert_eq!(list.nodes()[0].outer_html(), "<ul><li>x</li></ul>");
	assert_eq!(*seen.borrow(), [(Vec::<String>::new(), false)]);

	assert_eq!(list.slots("items")[0].keys(), ["a"]);
}

#[test]
fn unmount_disposes_nested_subscriptions() {
	let shared = cell(Value::<Node>::from("s"));
	let item = template(r#"<li out="v"></li>"#)
		.action("v", field("v"))
		.init({
			let shared = shared.clone();
			move || Value::dict([("v", Value::Reactive(shared.clone()))])
		})
		.build()
		.unwrap();
	let list = template(r#"<ul out="items"></ul>"#).build().unwrap().new(None).unwrap();
	list.set(Value::dict([("a", item.apply(Value::Null)), ("b", item.apply(Value::Null))]), None);
	assert_eq!(shared.subscriber_count(), 2);

	list.set(Value::dict([("b", item.apply(Value::Null))]), None);
	assert_eq!(shared.subscriber_count(), 1);

	list.unmount();
	assert_eq!(shared.subscriber_count(), 0);
}
