use std::io::Cursor;

use tracing::Level;
use tracing::subscriber::set_global_default;
use tracing_subscriber::FmtSubscriber;
use treepath::adapter::rcdom::parse_html;
use treepath::error::Result;


const WEBPAGE: &str = r#"
	<!DOCTYPE html>
	<html lang="en">
		<head>
			<meta charset="UTF-8">
			<title>Document</title>
		</head>
		<body>
			<div class="test1">Testing 1</div>
			<span class="test2">Testing 2</span>
			<a>Maybe</a>
			<div class="group1" aria-label="Watch Out!">
				<h1>The Group is here!</h1>
				<a class="clickable1">Don't click!</a>
			</div>
			<a class="clickable2">
				<img src="" alt="unable to display" />
			</a>
			<div class="group2" aria-label="Come in!">
				<a class="clickable3">Open Here!</a>
			</div>
		</body>
	</html>"#;

const COUNTRIES: &str = r#"
	<data asd="dsa">
		<country name="Liechtenstein"><rank>1</rank><year>2008</year></country>
		<country name="Singapore"><rank>4</rank><year>2011</year></country>
		<country name="Panama"><rank>68</rank><year>2011</year></country>
	</data>"#;

pub fn main() -> Result<()> {
	let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::DEBUG)
        .with_file(false)
        .with_line_number(true)
        .finish();

    set_global_default(subscriber).expect("setting default subscriber failed");

	// HTML via the rcdom adapter
	let document = parse_html(&mut Cursor::new(WEBPAGE)).expect("parse html");

	for item in treepath::query(
		document,
		r#"//a[starts-with(@class, "click")]/@class"#,
	)? {
		println!("clickable: {}", item.string_value());
	}

	// XML via the roxmltree adapter
	let doc = roxmltree::Document::parse(COUNTRIES).expect("parse xml");

	for item in treepath::query(
		doc.root_element(),
		"country[rank/text() eq '1']/year/text()",
	)? {
		println!("year: {}", item.string_value());
	}

	// Plain mapping data via the serde_json adapter
	let data = serde_json::json!({
		"name": "John",
		"age": 30,
		"pets": [{"type": "dog", "name": "Buddy"}, {"type": "cat", "name": "Whiskers"}],
	});

	for item in treepath::query(&data, "pets/*[type = 'cat']/name")? {
		println!("cat: {}", item.string_value());
	}

	Ok(())
}
