//! Floor plan canvas
//! Draws each room as a square of its area at its plan position, with pan and zoom
use iced::mouse::{self, Cursor};
use iced::widget::canvas::{self, Path, Program, Stroke};
use iced::{Color, Pixels, Point, Rectangle, Renderer, Size, Theme};

use tourforge::processing::floor_plan::{plan_extent, room_side};
use tourforge::state::data::RoomRecord;

use crate::Message;

/// Blank border around the plan, in screen pixels
const MARGIN: f32 = 16.0;

pub struct FloorPlanView<'a> {
    pub rooms: &'a [RoomRecord],
    /// 1.0 = plan fitted to the canvas
    pub zoom: f32,
    /// Pan offset in screen pixels
    pub offset: cgmath::Vector2<f32>,
}

/// Screen rectangle of every room, in room order
pub fn room_rects(rooms: &[RoomRecord], bounds: Size, zoom: f32, offset: cgmath::Vector2<f32>) -> Vec<Rectangle> {
    let extent = plan_extent(rooms);
    if extent.x <= 0.0 || extent.y <= 0.0 {
        return Vec::new();
    }

    let fit = ((bounds.width - 2.0 * MARGIN) / extent.x)
        .min((bounds.height - 2.0 * MARGIN) / extent.y)
        .max(0.0);
    let scale = fit * zoom;

    rooms
        .iter()
        .map(|room| {
            let side = room_side(room) * scale;
            Rectangle::new(
                Point::new(
                    MARGIN + room.layout.x * scale + offset.x,
                    MARGIN + room.layout.y * scale + offset.y,
                ),
                Size::new(side, side),
            )
        })
        .collect()
}

impl<'a> Program<Message> for FloorPlanView<'a> {
    type State = DragState;

    fn draw(
        &self,
        _state: &Self::State,
        renderer: &Renderer,
        _theme: &Theme,
        bounds: Rectangle,
        _cursor: Cursor,
    ) -> Vec<canvas::Geometry> {
        let mut frame = canvas::Frame::new(renderer, bounds.size());

        for (room, rect) in self.rooms.iter().zip(room_rects(self.rooms, bounds.size(), self.zoom, self.offset)) {
            let c = room.color;
            frame.fill_rectangle(rect.position(), rect.size(), Color::from_rgba8(c.r, c.g, c.b, c.a));
            frame.stroke(
                &Path::rectangle(rect.position(), rect.size()),
                Stroke::default().with_color(Color::WHITE).with_width(1.0),
            );
            frame.fill_text(canvas::Text {
                content: format!("{}\n{} m²", room.name, tourforge::export::description::format_area(room.area_sq_m)),
                position: Point::new(rect.x + 4.0, rect.y + 4.0),
                color: Color::WHITE,
                size: Pixels(13.0),
                ..canvas::Text::default()
            });
        }

        vec![frame.into_geometry()]
    }

    fn update(
        &self,
        state: &mut Self::State,
        event: canvas::Event,
        _bounds: Rectangle,
        cursor: Cursor,
    ) -> (canvas::event::Status, Option<Message>) {
        match event {
            canvas::Event::Mouse(mouse::Event::WheelScrolled { delta }) => {
                if cursor.position().is_none() {
                    return (canvas::event::Status::Ignored, None);
                }
                let zoom_delta = match delta {
                    mouse::ScrollDelta::Lines { y, .. } => y * 0.1,
                    mouse::ScrollDelta::Pixels { y, .. } => y * 0.01,
                };
                return (canvas::event::Status::Captured, Some(Message::PlanZoom(zoom_delta)));
            }

            canvas::Event::Mouse(mouse::Event::ButtonPressed(mouse::Button::Left)) => {
                if let Some(pos) = cursor.position() {
                    state.is_dragging = true;
                    state.last_position = Some(pos);
                    return (canvas::event::Status::Captured, None);
                }
            }

            canvas::Event::Mouse(mouse::Event::ButtonReleased(mouse::Button::Left)) => {
                state.is_dragging = false;
                state.last_position = None;
            }

            canvas::Event::Mouse(mouse::Event::CursorMoved { .. }) if state.is_dragging => {
                if let (Some(current), Some(last)) = (cursor.position(), state.last_position) {
                    state.last_position = Some(current);
                    let delta = cgmath::Vector2::new(current.x - last.x, current.y - last.y);
                    return (canvas::event::Status::Captured, Some(Message::PlanPan(delta)));
                }
            }

            _ => {}
        }

        (canvas::event::Status::Ignored, None)
    }
}

/// State for drag interactions
#[derive(Debug, Clone, Default)]
pub struct DragState {
    pub is_dragging: bool,
    pub last_position: Option<Point>,
}
