//! Canned result-page markup for tests

pub fn listing_html(
    title: &str,
    price: &str,
    sold: &str,
    link: &str,
    condition: Option<&str>,
) -> String {
    let condition = condition
        .map(|c| format!(r#"<div class="s-item__subtitle"><span class="SECONDARY_INFO">{}</span></div>"#, c))
        .unwrap_or_default();
    format!(
        r#"<li class="s-item s-item__pl-on-bottom">
  <div class="s-item__info clearfix">
    <div class="s-item__caption"><span class="s-item__caption--signal POSITIVE"><span>{sold}</span></span></div>
    <a class="s-item__link" href="{link}"><div class="s-item__title"><span role="heading">{title}</span></div></a>
    {condition}
    <div class="s-item__details"><span class="s-item__price"><span class="POSITIVE ITALIC">{price}</span></span></div>
  </div>
</li>"#
    )
}

pub fn results_page(items: &[String]) -> String {
    format!(
        r#"<html><body><div class="srp-river-results">
<ul class="srp-results srp-list clearfix">
{}
</ul>
</div></body></html>"#,
        items.join("\n")
    )
}
