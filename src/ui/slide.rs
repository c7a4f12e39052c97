use iced::widget::{container, image, text};
use iced::{Background, Color, ContentFit, Element, Length, Theme};
use std::path::Path;

/// Full screen view of one slide
///
/// Shows `current` scaled to fit. With nothing to show it falls back to the
/// splash image, and without a splash to the title text.
pub fn slide<'a, Message: 'a>(
    current: Option<&Path>,
    splash: Option<&Path>,
    title: &str,
) -> Element<'a, Message> {
    let content: Element<'a, Message> = match current.or(splash) {
        Some(path) => image(image::Handle::from_path(path))
            .content_fit(ContentFit::Contain)
            .width(Length::Fill)
            .height(Length::Fill)
            .into(),
        None => text(title.to_string()).size(48).color(Color::WHITE).into(),
    };

    container(content)
        .width(Length::Fill)
        .height(Length::Fill)
        .center_x(Length::Fill)
        .center_y(Length::Fill)
        .style(black_background)
        .into()
}

fn black_background(_theme: &Theme) -> container::Style {
    container::Style {
        background: Some(Background::Color(Color::BLACK)),
        ..container::Style::default()
    }
}
